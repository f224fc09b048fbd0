//! CRFの内部計算コンテキスト
//!
//! 1系列分の状態スコア・遷移スコア・前向き/後ろ向きスコアの表を保持
//! します。禁止された遷移は負の無限大のスコアで表現されます。

use ndarray::Array2;

use crate::crf::{log_sum_exp, FeatureFunction};

/// 1系列分の計算コンテキスト
///
/// `state` は `[T][L]` の状態スコア行列、`trans` は各内部境界の `[L][L]`
/// 遷移スコア行列です。文頭・文末境界の遷移スコアは `start` と `end` に
/// 分けて保持します。
pub(crate) struct CrfContext {
    num_labels: usize,
    len: usize,

    state: Array2<f64>,
    start: Vec<f64>,
    end: Vec<f64>,
    trans: Vec<Array2<f64>>,

    // Score of the virtual end-position unigram features. Constant over all
    // paths of the sequence.
    end_state: f64,

    alpha: Array2<f64>,
    beta: Array2<f64>,

    // log_sum over paths, excluding end_state.
    inner_log_norm: f64,
}

impl CrfContext {
    /// 素性関数と重みからコンテキストを構築します。
    pub(crate) fn build(ff: &dyn FeatureFunction, weights: &[f64]) -> Self {
        let labels = ff.labels();
        let l = labels.len();
        let t = ff.len();
        let mut scratch = vec![];

        let mut state = Array2::zeros((t.max(1), l.max(1)));
        for pos in 0..t {
            for (jx, &label) in labels.iter().enumerate() {
                scratch.clear();
                ff.unigram(pos, label, &mut scratch);
                state[[pos, jx]] = dot(weights, &scratch);
            }
        }

        let start_label = ff.start_label();
        let end_label = ff.end_label();
        let mut start = vec![f64::NEG_INFINITY; l];
        let mut end = vec![f64::NEG_INFINITY; l];
        for (jx, &label) in labels.iter().enumerate() {
            if ff.transition_allowed(start_label, label) {
                scratch.clear();
                ff.bigram(0, start_label, label, &mut scratch);
                start[jx] = dot(weights, &scratch);
            }
            if ff.transition_allowed(label, end_label) {
                scratch.clear();
                ff.bigram(t, label, end_label, &mut scratch);
                end[jx] = dot(weights, &scratch);
            }
        }

        let mut trans = Vec::with_capacity(t.saturating_sub(1));
        for pos in 1..t {
            let mut matrix = Array2::from_elem((l, l), f64::NEG_INFINITY);
            for (ix, &prev) in labels.iter().enumerate() {
                for (jx, &label) in labels.iter().enumerate() {
                    if ff.transition_allowed(prev, label) {
                        scratch.clear();
                        ff.bigram(pos, prev, label, &mut scratch);
                        matrix[[ix, jx]] = dot(weights, &scratch);
                    }
                }
            }
            trans.push(matrix);
        }

        scratch.clear();
        ff.unigram(t, end_label, &mut scratch);
        let end_state = dot(weights, &scratch);

        Self {
            num_labels: l,
            len: t,
            state,
            start,
            end,
            trans,
            end_state,
            alpha: Array2::zeros((t.max(1), l.max(1))),
            beta: Array2::zeros((t.max(1), l.max(1))),
            inner_log_norm: f64::NEG_INFINITY,
        }
    }

    /// 最尤ラベル経路(ラベルインデックス列)とそのスコアを返します。
    pub(crate) fn viterbi(&self) -> Option<(Vec<usize>, f64)> {
        let t = self.len;
        let l = self.num_labels;
        if t == 0 || l == 0 {
            return None;
        }
        let mut best = Array2::from_elem((t, l), f64::NEG_INFINITY);
        let mut backward_edge = Array2::zeros((t, l));
        for j in 0..l {
            best[[0, j]] = self.start[j] + self.state[[0, j]];
        }
        for time in 1..t {
            for j in 0..l {
                let mut max_score = f64::NEG_INFINITY;
                let mut argmax = 0usize;
                for i in 0..l {
                    let score = best[[time - 1, i]] + self.trans[time - 1][[i, j]];
                    if score > max_score {
                        max_score = score;
                        argmax = i;
                    }
                }
                backward_edge[[time, j]] = argmax;
                best[[time, j]] = max_score + self.state[[time, j]];
            }
        }

        let mut max_score = f64::NEG_INFINITY;
        let mut last = 0usize;
        for j in 0..l {
            let score = best[[t - 1, j]] + self.end[j];
            if score > max_score {
                max_score = score;
                last = j;
            }
        }
        if max_score == f64::NEG_INFINITY {
            return None;
        }

        let mut path = vec![0usize; t];
        path[t - 1] = last;
        for time in (0..t - 1).rev() {
            path[time] = backward_edge[[time + 1, path[time + 1]]];
        }
        Some((path, max_score + self.end_state))
    }

    /// 前向き・後ろ向きスコアを計算します。
    pub(crate) fn forward_backward(&mut self) {
        let t = self.len;
        let l = self.num_labels;
        if t == 0 || l == 0 {
            self.inner_log_norm = f64::NEG_INFINITY;
            return;
        }
        for j in 0..l {
            self.alpha[[0, j]] = self.start[j] + self.state[[0, j]];
        }
        for time in 1..t {
            for j in 0..l {
                let sum = log_sum_exp(
                    (0..l).map(|i| self.alpha[[time - 1, i]] + self.trans[time - 1][[i, j]]),
                );
                self.alpha[[time, j]] = sum + self.state[[time, j]];
            }
        }
        for j in 0..l {
            self.beta[[t - 1, j]] = self.end[j];
        }
        for time in (0..t - 1).rev() {
            for i in 0..l {
                let sum = log_sum_exp((0..l).map(|j| {
                    self.trans[time][[i, j]] + self.state[[time + 1, j]] + self.beta[[time + 1, j]]
                }));
                self.beta[[time, i]] = sum;
            }
        }
        self.inner_log_norm =
            log_sum_exp((0..l).map(|j| self.alpha[[t - 1, j]] + self.end[j]));
    }

    /// 対数正規化項を返します。[`CrfContext::forward_backward`]の後に
    /// 呼び出してください。
    pub(crate) fn log_norm(&self) -> f64 {
        self.inner_log_norm + self.end_state
    }

    /// 位置 `time` でラベルインデックス `j` を取る周辺確率を返します。
    pub(crate) fn marginal(&self, time: usize, j: usize) -> f64 {
        if self.inner_log_norm == f64::NEG_INFINITY {
            return 0.0;
        }
        (self.alpha[[time, j]] + self.beta[[time, j]] - self.inner_log_norm).exp()
    }

    /// 境界 `time`(1..T)で `(i, j)` と遷移する周辺確率を返します。
    pub(crate) fn pair_marginal(&self, time: usize, i: usize, j: usize) -> f64 {
        if self.inner_log_norm == f64::NEG_INFINITY {
            return 0.0;
        }
        (self.alpha[[time - 1, i]]
            + self.trans[time - 1][[i, j]]
            + self.state[[time, j]]
            + self.beta[[time, j]]
            - self.inner_log_norm)
            .exp()
    }
}

fn dot(weights: &[f64], features: &[(u32, f64)]) -> f64 {
    features
        .iter()
        .map(|&(index, value)| weights[index as usize] * value)
        .sum()
}
