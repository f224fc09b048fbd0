//! 文字列カーネルによる二値SVM
//!
//! このモジュールは、音節列に対する文字列カーネルと、双対座標降下法で
//! 学習する二値SVMを提供します。変換クラスごとの語形分類器の実体です。
//!
//! カーネルの基礎値は2語形間の共通部分列(連続する音節列)の出現対の総数で、
//! 接尾辞一致の動的計画法により O(nm) で計算されます。基礎値は設定可能な
//! 指数でべき乗され、さらにオプションでガウスカーネルに包むことができます。

use serde::{Deserialize, Serialize};

use crate::word::SyllabicWord;

/// SVMの学習オプション
///
/// 交差検証のグリッド要素としても使用されます。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SvmOptions {
    /// 文字列カーネルの指数
    pub exponent: u32,

    /// ガウスカーネルの幅。`None` の場合はべき乗カーネルをそのまま使用します。
    pub gaussian_gamma: Option<f64>,

    /// マージン・スラックのハイパーパラメータ(ボックス制約の上限)
    pub cost: f64,

    /// 座標降下の最大エポック数
    pub max_iter: usize,

    /// 収束判定の許容誤差
    pub tolerance: f64,
}

impl Default for SvmOptions {
    fn default() -> Self {
        Self {
            exponent: 2,
            gaussian_gamma: None,
            cost: 1.0,
            max_iter: 200,
            tolerance: 1e-3,
        }
    }
}

// Total number of shared contiguous syllable substrings, counted per
// occurrence pair. The suffix-run DP makes this O(nm).
fn base_kernel(a: &SyllabicWord, b: &SyllabicWord) -> f64 {
    let sa = a.syllables();
    let sb = b.syllables();
    if sa.is_empty() || sb.is_empty() {
        return 0.0;
    }
    let mut total = 0u64;
    let mut prev = vec![0u64; sb.len() + 1];
    for xa in sa {
        let mut cur = vec![0u64; sb.len() + 1];
        for (j, xb) in sb.iter().enumerate() {
            if xa == xb {
                cur[j + 1] = prev[j] + 1;
                total += cur[j + 1];
            }
        }
        prev = cur;
    }
    total as f64
}

fn powered_kernel(a: &SyllabicWord, b: &SyllabicWord, exponent: u32) -> f64 {
    base_kernel(a, b).powi(exponent as i32)
}

/// 2語形間のカーネル値を計算します。
///
/// # 引数
///
/// * `a` - 語形
/// * `b` - 語形
/// * `options` - カーネル設定(指数とガウス幅)
pub fn kernel(a: &SyllabicWord, b: &SyllabicWord, options: &SvmOptions) -> f64 {
    let k = powered_kernel(a, b, options.exponent);
    match options.gaussian_gamma {
        Some(gamma) => {
            let kaa = powered_kernel(a, a, options.exponent);
            let kbb = powered_kernel(b, b, options.exponent);
            (-gamma * (kaa + kbb - 2.0 * k)).exp()
        }
        None => k,
    }
}

/// カーネルSVM
///
/// 学習済みのサポートベクトルと係数を保持する、状態を持たないスコア
/// 関数です。正のスコアはクラスへの所属を意味します。
#[derive(Clone, Debug)]
pub struct KernelSvm {
    options: SvmOptions,
    support: Vec<(SyllabicWord, f64)>,
}

impl KernelSvm {
    /// 正例と負例から二値SVMを学習します。
    ///
    /// 双対問題を座標降下法で解きます。双対変数はボックス制約
    /// `[0, cost]` に射影され、射影勾配の最大値が許容誤差を下回るか
    /// 最大エポック数に達した時点で停止します。
    ///
    /// # 引数
    ///
    /// * `positives` - 正例の語形
    /// * `negatives` - 負例の語形
    /// * `options` - 学習オプション
    ///
    /// # 戻り値
    ///
    /// 学習済みのSVM
    pub fn train(
        positives: &[SyllabicWord],
        negatives: &[SyllabicWord],
        options: &SvmOptions,
    ) -> Self {
        let n = positives.len() + negatives.len();
        let mut words = Vec::with_capacity(n);
        let mut labels = Vec::with_capacity(n);
        for w in positives {
            words.push(w.clone());
            labels.push(1.0);
        }
        for w in negatives {
            words.push(w.clone());
            labels.push(-1.0);
        }
        if n == 0 {
            return Self {
                options: options.clone(),
                support: vec![],
            };
        }

        // Dense Gram matrix; per-class training sets are small after
        // decimation.
        let mut gram = vec![0.0; n * n];
        for i in 0..n {
            for j in i..n {
                let k = kernel(&words[i], &words[j], options);
                gram[i * n + j] = k;
                gram[j * n + i] = k;
            }
        }

        let mut alpha = vec![0.0f64; n];
        // f[i] = sum_j alpha[j] * y[j] * K(i, j)
        let mut f = vec![0.0f64; n];
        for _ in 0..options.max_iter {
            let mut max_violation = 0.0f64;
            for i in 0..n {
                let grad = labels[i] * f[i] - 1.0;
                let projected = if alpha[i] <= 0.0 {
                    grad.min(0.0)
                } else if alpha[i] >= options.cost {
                    grad.max(0.0)
                } else {
                    grad
                };
                max_violation = max_violation.max(projected.abs());
                if projected.abs() <= options.tolerance {
                    continue;
                }
                let q = gram[i * n + i];
                if q <= 0.0 {
                    continue;
                }
                let updated = (alpha[i] - grad / q).clamp(0.0, options.cost);
                let delta = updated - alpha[i];
                if delta == 0.0 {
                    continue;
                }
                alpha[i] = updated;
                for j in 0..n {
                    f[j] += delta * labels[i] * gram[i * n + j];
                }
            }
            if max_violation <= options.tolerance {
                break;
            }
        }

        let support = words
            .into_iter()
            .zip(alpha.iter().zip(&labels))
            .filter(|(_, (&a, _))| a > 0.0)
            .map(|(w, (&a, &y))| (w, a * y))
            .collect();
        Self {
            options: options.clone(),
            support,
        }
    }

    /// 語形のスコアを計算します。
    ///
    /// # 戻り値
    ///
    /// 判別関数の値。正の値はクラスへの所属を意味します。
    pub fn score(&self, word: &SyllabicWord) -> f64 {
        self.support
            .iter()
            .map(|(sv, coef)| coef * kernel(sv, word, &self.options))
            .sum()
    }

    /// サポートベクトル数を返します。
    pub fn support_len(&self) -> usize {
        self.support.len()
    }

    /// 学習時のオプションを返します。
    pub fn options(&self) -> &SvmOptions {
        &self.options
    }
}
