//! CRFの学習アルゴリズム
//!
//! オフライン(全バッチ勾配 + L2正則化)とオンライン(減衰学習率のSGD)の
//! 2つの学習エントリポイントを提供します。どちらも対数尤度の勾配を
//! 前向き・後ろ向きの周辺確率から計算します。
//!
//! 正解経路が遷移制約に反する系列は学習から除外され、除外数が警告として
//! 記録されます。

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::crf::{CrfContext, FeatureFunction, LinearChainCrf};
use crate::errors::{LegatoError, Result};

/// オフライン学習のオプション
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OfflineOptions {
    /// L2正則化係数
    pub l2: f64,

    /// 学習率
    pub learning_rate: f64,

    /// 反復回数
    pub max_iter: u64,
}

impl Default for OfflineOptions {
    fn default() -> Self {
        Self {
            l2: 0.01,
            learning_rate: 0.1,
            max_iter: 100,
        }
    }
}

/// オンライン学習のサンプル順序ポリシー
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleOrder {
    /// シード付き乱数による復元抽出
    SeededRandom {
        /// 乱数シード
        seed: u64,
    },

    /// 周回順
    Cyclic,
}

/// オンライン学習のオプション
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OnlineOptions {
    /// L2正則化係数
    pub l2: f64,

    /// 初期学習率
    pub eta0: f64,

    /// エポック数
    pub max_iter: u64,

    /// サンプル順序ポリシー
    pub order: SampleOrder,
}

impl Default for OnlineOptions {
    fn default() -> Self {
        Self {
            l2: 0.01,
            eta0: 0.1,
            max_iter: 10,
            order: SampleOrder::Cyclic,
        }
    }
}

/// 全バッチ勾配でCRFを学習します。
///
/// # 引数
///
/// * `data` - (素性関数, 正解ラベル列) の対
/// * `num_weights` - 重みベクトルの長さ
/// * `options` - 学習オプション
///
/// # エラー
///
/// オプションが事前条件を満たさない場合は引数エラー、学習可能な系列が
/// 1つもない場合はデータ不足エラーが返されます。
pub fn offline_train<F>(
    data: &[(F, Vec<u32>)],
    num_weights: usize,
    options: &OfflineOptions,
) -> Result<LinearChainCrf>
where
    F: FeatureFunction,
{
    validate_common(options.l2, options.learning_rate, options.max_iter, data.len())?;
    let mut weights = vec![0.0; num_weights];
    let mut skipped_logged = false;
    for _ in 0..options.max_iter {
        let mut gradient = vec![0.0; num_weights];
        let mut used = 0usize;
        let mut skipped = 0usize;
        for (ff, gold) in data {
            if accumulate_gradient(ff, gold, &weights, &mut gradient) {
                used += 1;
            } else {
                skipped += 1;
            }
        }
        if used == 0 {
            return Err(LegatoError::insufficient_data(
                "no training sequence admits a feasible gold path",
                "check the bigram table against the training sentences",
            ));
        }
        if skipped > 0 && !skipped_logged {
            log::warn!("skipped {skipped} sequences with infeasible gold paths");
            skipped_logged = true;
        }
        let scale = options.learning_rate / used as f64;
        for (w, g) in weights.iter_mut().zip(&gradient) {
            *w += scale * g - options.learning_rate * options.l2 * *w;
        }
    }
    Ok(LinearChainCrf::new(weights))
}

/// 確率的勾配でCRFを学習します。
///
/// 学習率はステップ `t` に対して `eta0 / (1 + t/n)` で減衰します。
/// サンプルの順序は[`SampleOrder`]で制御します。
pub fn online_train<F>(
    data: &[(F, Vec<u32>)],
    num_weights: usize,
    options: &OnlineOptions,
) -> Result<LinearChainCrf>
where
    F: FeatureFunction,
{
    validate_common(options.l2, options.eta0, options.max_iter, data.len())?;
    let n = data.len();
    let mut weights = vec![0.0; num_weights];
    let mut gradient = vec![0.0; num_weights];
    let mut rng = match options.order {
        SampleOrder::SeededRandom { seed } => Some(StdRng::seed_from_u64(seed)),
        SampleOrder::Cyclic => None,
    };
    let mut step = 0u64;
    let mut used_any = false;
    for _ in 0..options.max_iter {
        for position in 0..n {
            let index = match rng.as_mut() {
                Some(rng) => rng.gen_range(0..n),
                None => position,
            };
            let (ff, gold) = &data[index];
            gradient.iter_mut().for_each(|g| *g = 0.0);
            if !accumulate_gradient(ff, gold, &weights, &mut gradient) {
                continue;
            }
            used_any = true;
            let eta = options.eta0 / (1.0 + step as f64 / n as f64);
            for (w, g) in weights.iter_mut().zip(&gradient) {
                *w += eta * (g - options.l2 * *w);
            }
            step += 1;
        }
    }
    if !used_any {
        return Err(LegatoError::insufficient_data(
            "no training sequence admits a feasible gold path",
            "check the bigram table against the training sentences",
        ));
    }
    Ok(LinearChainCrf::new(weights))
}

fn validate_common(l2: f64, rate: f64, max_iter: u64, data_len: usize) -> Result<()> {
    if !l2.is_finite() || l2 < 0.0 {
        return Err(LegatoError::invalid_argument(
            "l2",
            "the regularization coefficient must be non-negative",
        ));
    }
    if !rate.is_finite() || rate <= 0.0 {
        return Err(LegatoError::invalid_argument(
            "learning_rate",
            "the learning rate must be positive",
        ));
    }
    if max_iter == 0 {
        return Err(LegatoError::invalid_argument(
            "max_iter",
            "at least one iteration is required",
        ));
    }
    if data_len == 0 {
        return Err(LegatoError::insufficient_data(
            "no training sequences",
            "provide at least one tagged sentence",
        ));
    }
    Ok(())
}

// Adds (observed - expected) feature counts of one sequence to the gradient.
// Returns false when the gold path violates the transition constraints or the
// lattice admits no path at all.
fn accumulate_gradient<F>(ff: &F, gold: &[u32], weights: &[f64], gradient: &mut [f64]) -> bool
where
    F: FeatureFunction,
{
    let t = ff.len();
    if t == 0 || gold.len() != t {
        return false;
    }
    let start = ff.start_label();
    let end = ff.end_label();
    if !ff.transition_allowed(start, gold[0]) {
        return false;
    }
    for time in 1..t {
        if !ff.transition_allowed(gold[time - 1], gold[time]) {
            return false;
        }
    }
    if !ff.transition_allowed(gold[t - 1], end) {
        return false;
    }

    let mut ctx = CrfContext::build(ff, weights);
    ctx.forward_backward();
    if ctx.log_norm() == f64::NEG_INFINITY {
        return false;
    }

    let mut scratch = vec![];

    // Observed features along the gold path. The virtual end-position unigram
    // occurs in every path, so its observed and expected counts cancel.
    for (time, &label) in gold.iter().enumerate() {
        scratch.clear();
        ff.unigram(time, label, &mut scratch);
        add_sparse(gradient, &scratch, 1.0);
    }
    scratch.clear();
    ff.bigram(0, start, gold[0], &mut scratch);
    add_sparse(gradient, &scratch, 1.0);
    for time in 1..t {
        scratch.clear();
        ff.bigram(time, gold[time - 1], gold[time], &mut scratch);
        add_sparse(gradient, &scratch, 1.0);
    }
    scratch.clear();
    ff.bigram(t, gold[t - 1], end, &mut scratch);
    add_sparse(gradient, &scratch, 1.0);

    // Expected features under the model distribution.
    let labels = ff.labels();
    for time in 0..t {
        for (jx, &label) in labels.iter().enumerate() {
            let p = ctx.marginal(time, jx);
            if p <= 0.0 {
                continue;
            }
            scratch.clear();
            ff.unigram(time, label, &mut scratch);
            add_sparse(gradient, &scratch, -p);
            if time == 0 {
                scratch.clear();
                ff.bigram(0, start, label, &mut scratch);
                add_sparse(gradient, &scratch, -p);
            }
            if time == t - 1 {
                scratch.clear();
                ff.bigram(t, label, end, &mut scratch);
                add_sparse(gradient, &scratch, -p);
            }
        }
    }
    for time in 1..t {
        for (ix, &prev) in labels.iter().enumerate() {
            for (jx, &label) in labels.iter().enumerate() {
                let p = ctx.pair_marginal(time, ix, jx);
                if p <= 0.0 {
                    continue;
                }
                scratch.clear();
                ff.bigram(time, prev, label, &mut scratch);
                add_sparse(gradient, &scratch, -p);
            }
        }
    }
    true
}

fn add_sparse(gradient: &mut [f64], features: &[(u32, f64)], scale: f64) {
    for &(index, value) in features {
        gradient[index as usize] += scale * value;
    }
}
