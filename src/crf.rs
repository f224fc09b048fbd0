//! 線形連鎖CRFエンジン
//!
//! このモジュールは、系列モデルアダプタが利用する線形連鎖の系列最適化
//! エンジンを提供します。素性関数は不透明な契約([`FeatureFunction`])と
//! して受け取り、エンジン側は疎な素性ベクトルと遷移可否マスクだけを
//! 前提にします。
//!
//! 提供する機能は次の3つです。
//!
//! - デコード: ビタビアルゴリズムによる最尤タグ経路の探索。遷移制約が
//!   有効な経路を1つも許さない場合は `None` を返します。
//! - 尤度: 対数正規化項(全経路スコアの対数和)の計算。
//! - 学習: 全バッチ勾配によるオフライン学習と、減衰学習率の確率的勾配
//!   によるオンライン学習。
//!
//! 数値はすべて対数領域で扱い、禁止された遷移は負の無限大として伝播
//! させます。

mod context;
mod trainer;

pub(crate) use crate::crf::context::CrfContext;
pub use crate::crf::trainer::{
    offline_train, online_train, OfflineOptions, OnlineOptions, SampleOrder,
};

/// 素性関数の契約
///
/// 系列の各位置に対して疎な素性ベクトルを返します。位置 `len()` は仮想的な
/// 文末位置で、終端素性の放出と終端境界への遷移に使用されます。
pub trait FeatureFunction {
    /// 重みベクトルの長さを返します。
    fn num_weights(&self) -> usize;

    /// 系列長(語数)を返します。
    fn len(&self) -> usize;

    /// 候補ラベルを返します。
    fn labels(&self) -> &[u32];

    /// 文頭境界ラベルを返します。
    fn start_label(&self) -> u32;

    /// 文末境界ラベルを返します。
    fn end_label(&self) -> u32;

    /// 位置 `pos` のラベル `label` に対するunigram素性を `out` に追記します。
    ///
    /// `pos == len()` は文末位置で、`label` には文末境界ラベルが渡されます。
    fn unigram(&self, pos: usize, label: u32, out: &mut Vec<(u32, f64)>);

    /// 境界位置 `pos` の遷移 `(prev, label)` に対するbigram素性を `out` に
    /// 追記します。
    ///
    /// `pos == 0` では `prev` に文頭境界ラベル、`pos == len()` では `label`
    /// に文末境界ラベルが渡されます。許可されない遷移では何も追記しません。
    fn bigram(&self, pos: usize, prev: u32, label: u32, out: &mut Vec<(u32, f64)>);

    /// 遷移 `(prev, label)` が許可されている場合に `true` を返します。
    fn transition_allowed(&self, prev: u32, label: u32) -> bool;
}

/// 学習済みの線形連鎖CRF
///
/// 重みベクトルだけを保持します。重みの配置は素性関数側の契約
/// ([`crate::features::FeatureLayout`])で決まります。
#[derive(Clone, Debug)]
pub struct LinearChainCrf {
    weights: Vec<f64>,
}

impl LinearChainCrf {
    /// 重みベクトルからCRFを作成します。
    pub fn new(weights: Vec<f64>) -> Self {
        Self { weights }
    }

    /// 重みベクトルを返します。
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// 最尤ラベル経路とそのスコアを返します。
    ///
    /// # 戻り値
    ///
    /// `(ラベル列, 経路スコア)`。遷移制約が有効な経路を許さない場合や
    /// 系列が空の場合は `None`
    pub fn decode(&self, ff: &dyn FeatureFunction) -> Option<(Vec<u32>, f64)> {
        let ctx = CrfContext::build(ff, &self.weights);
        let (indices, score) = ctx.viterbi()?;
        let labels = ff.labels();
        Some((indices.into_iter().map(|i| labels[i]).collect(), score))
    }

    /// 対数正規化項(全経路スコアの対数和)を返します。
    ///
    /// 有効な経路が存在しない場合は負の無限大です。
    pub fn log_norm(&self, ff: &dyn FeatureFunction) -> f64 {
        let mut ctx = CrfContext::build(ff, &self.weights);
        ctx.forward_backward();
        ctx.log_norm()
    }

    /// 最尤経路とその経路確率を返します。
    pub fn decode_with_probability(&self, ff: &dyn FeatureFunction) -> Option<(Vec<u32>, f64)> {
        let (labels, score) = self.decode(ff)?;
        let log_norm = self.log_norm(ff);
        Some((labels, (score - log_norm).exp()))
    }
}

/// 対数領域での総和を計算します。
pub(crate) fn log_sum_exp(values: impl Iterator<Item = f64>) -> f64 {
    let values: Vec<f64> = values.collect();
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max == f64::NEG_INFINITY {
        return f64::NEG_INFINITY;
    }
    max + values.iter().map(|v| (v - max).exp()).sum::<f64>().ln()
}
