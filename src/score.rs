//! 語形スコアとスコア取得ポリシー
//!
//! このモジュールは、分類器と辞書から得られた語形ごとのスコア集約
//! ([`ScoreBank`])と、3種類のスコア取得ポリシー([`ScorePolicy`])、
//! および類推強化の減衰関数([`Falloff`])を提供します。

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::classifier::WordFeature;
use crate::tag::{Tag, TagSet};

/// 辞書ヒットに与えられる固定スコア
pub(crate) const DICTIONARY_SCORE: f64 = 10.0;

/// 1つの素性に対するスコア
///
/// 値は類推強化の際にその場で加算されます。
#[derive(Clone, Debug)]
pub struct Score {
    feature: WordFeature,
    value: f64,
}

impl Score {
    pub(crate) fn new(feature: WordFeature, value: f64) -> Self {
        Self { feature, value }
    }

    /// スコアの素性を返します。
    pub fn feature(&self) -> &WordFeature {
        &self.feature
    }

    /// スコア値を返します。
    pub fn value(&self) -> f64 {
        self.value
    }

    pub(crate) fn reinforce(&mut self, delta: f64) {
        self.value += delta;
    }
}

/// スコア取得ポリシー
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScorePolicy {
    /// 辞書スコアが存在するタグでは辞書スコアのみを返します。
    Prioritized,

    /// 辞書と分類器の両方を合わせて返します。ただしタグ種別が非関連の
    /// 場合は辞書スコアのみです。
    Mixed,

    /// [`Mixed`](Self::Mixed)と同じ取得規則ですが、バンクへの問い合わせを
    /// 残余辞書(分類器を持つクラスを除外した辞書)で行うことで、例外
    /// クラスのみの語が分類器の証拠を覆い隠さないようにします。
    Proportional,
}

impl ScorePolicy {
    /// このポリシーでバンクに問い合わせる際の辞書の範囲を返します。
    pub fn dictionary_option(self) -> DictionaryOption {
        match self {
            Self::Proportional => DictionaryOption::Residual,
            _ => DictionaryOption::Full,
        }
    }
}

/// 辞書参照の範囲
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DictionaryOption {
    /// 辞書全体を参照します。
    Full,

    /// クラスがすでに分類器を持つエントリを除外して参照します。
    Residual,
}

/// 類推強化の減衰関数
///
/// 距離に対して単調減少で、重みは常に非負です。
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum Falloff {
    /// `1 / (1 + lambda * d)`
    Reciprocal {
        /// 減衰率
        lambda: f64,
    },

    /// `exp(-lambda * d)`
    Exponential {
        /// 減衰率
        lambda: f64,
    },
}

impl Falloff {
    /// 距離に対する減衰重みを返します。
    pub fn weight(&self, distance: f64) -> f64 {
        match self {
            Self::Reciprocal { lambda } => 1.0 / (1.0 + lambda * distance),
            Self::Exponential { lambda } => (-lambda * distance).exp(),
        }
    }
}

/// 類推強化のオプション
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnalogyOptions {
    /// 近傍検索の正規化編集距離の上限
    pub max_normalized_distance: f64,

    /// 減衰関数
    pub falloff: Falloff,
}

impl Default for AnalogyOptions {
    fn default() -> Self {
        Self {
            max_normalized_distance: 0.5,
            falloff: Falloff::Reciprocal { lambda: 1.0 },
        }
    }
}

/// 語形ごとのスコア集約
///
/// 分類器由来と辞書由来のスコアを、それぞれタグで索引付けして保持します。
#[derive(Debug, Default)]
pub struct ScoreBank {
    classifier_scores: HashMap<Tag, Vec<Score>>,
    dictionary_scores: HashMap<Tag, Vec<Score>>,
}

impl ScoreBank {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push_classifier(&mut self, score: Score) {
        self.classifier_scores
            .entry(score.feature.class().tag())
            .or_default()
            .push(score);
    }

    // Dictionary hits carry a fixed value, so same-feature hits for one tag
    // collapse to a single entry. This is what keeps per-position feature ids
    // unique in the condensed id mode.
    pub(crate) fn push_dictionary(&mut self, score: Score) {
        let scores = self
            .dictionary_scores
            .entry(score.feature.class().tag())
            .or_default();
        if scores.iter().any(|s| s.feature.id() == score.feature.id()) {
            return;
        }
        scores.push(score);
    }

    /// スコアを1つでも持つタグを列挙します。
    pub fn tags(&self) -> Vec<Tag> {
        let mut tags: Vec<Tag> = self
            .classifier_scores
            .keys()
            .chain(self.dictionary_scores.keys())
            .copied()
            .collect();
        tags.sort_unstable();
        tags.dedup();
        tags
    }

    /// タグに対する分類器スコアを返します。
    pub fn classifier_scores(&self, tag: Tag) -> &[Score] {
        self.classifier_scores
            .get(&tag)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// タグに対する辞書スコアを返します。
    pub fn dictionary_scores(&self, tag: Tag) -> &[Score] {
        self.dictionary_scores
            .get(&tag)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// ポリシーに従ってタグのスコアを取得します。
    ///
    /// # 引数
    ///
    /// * `tag` - 対象のタグ
    /// * `policy` - スコア取得ポリシー
    /// * `tag_set` - タグ種別の問い合わせ先
    pub fn scores<'a>(
        &'a self,
        tag: Tag,
        policy: ScorePolicy,
        tag_set: &TagSet,
    ) -> impl Iterator<Item = &'a Score> {
        let dict = self.dictionary_scores(tag);
        let classifier = match policy {
            ScorePolicy::Prioritized => {
                if dict.is_empty() {
                    self.classifier_scores(tag)
                } else {
                    &[]
                }
            }
            ScorePolicy::Mixed | ScorePolicy::Proportional => {
                if tag_set.is_unrelated(tag) {
                    &[]
                } else {
                    self.classifier_scores(tag)
                }
            }
        };
        dict.iter().chain(classifier.iter())
    }

    /// 全スコア(分類器・辞書の両方)を可変参照で列挙します。
    pub(crate) fn all_scores_mut(&mut self) -> impl Iterator<Item = (Tag, &mut Score)> {
        self.classifier_scores
            .iter_mut()
            .chain(self.dictionary_scores.iter_mut())
            .flat_map(|(tag, scores)| scores.iter_mut().map(move |s| (*tag, s)))
    }

    /// 全スコア(分類器・辞書の両方)を列挙します。
    pub fn all_scores(&self) -> impl Iterator<Item = (Tag, &Score)> {
        self.classifier_scores
            .iter()
            .chain(self.dictionary_scores.iter())
            .flat_map(|(tag, scores)| scores.iter().map(move |s| (*tag, s)))
    }

    /// スコアを1つも持たない場合に `true` を返します。
    pub fn is_empty(&self) -> bool {
        self.classifier_scores.values().all(Vec::is_empty)
            && self.dictionary_scores.values().all(Vec::is_empty)
    }
}
