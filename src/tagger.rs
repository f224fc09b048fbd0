//! 系列モデルアダプタ
//!
//! このモジュールは、境界タグとバイグラム制約、素性関数ファクトリを
//! 線形連鎖CRFエンジンに配線する[`SentenceClassifier`]を提供します。
//! 学習では (語列, タグ列) の対と構造設定をエンジンに渡して重みベクトル
//! を受け取り、推論では最尤タグ経路のデコードと、デコード経路からの
//! レンマ再構成を行います。

use std::sync::Arc;

use hashbrown::HashSet;

use crate::crf::{offline_train, online_train, LinearChainCrf, OfflineOptions, OnlineOptions};
use crate::errors::{LegatoError, Result};
use crate::features::{FeatureFunctionFactory, SentenceProvider};
use crate::tag::Tag;
use crate::word::SyllabicWord;

/// タグ付けの学習データの1文
pub type TaggedWords = (Vec<SyllabicWord>, Vec<Tag>);

/// 文分類器
///
/// 学習済みのCRF重みベクトルと素性関数ファクトリを束ねます。重みベクトル
/// の長さは素性配置の素性関数総数と常に一致している必要があり、一致しない
/// 場合の操作は状態エラーで失敗します。
pub struct SentenceClassifier {
    factory: FeatureFunctionFactory,
    crf: LinearChainCrf,
}

impl SentenceClassifier {
    /// オフライン(全バッチ勾配)でCRFを学習します。
    ///
    /// # 引数
    ///
    /// * `factory` - 素性関数ファクトリ
    /// * `data` - (語列, タグ列) の対
    /// * `options` - オフライン学習のオプション
    pub fn offline_train(
        factory: FeatureFunctionFactory,
        data: &[TaggedWords],
        options: &OfflineOptions,
    ) -> Result<Self> {
        let prepared = prepare(&factory, data)?;
        let crf = offline_train(&prepared, factory.layout().feature_functions_count(), options)?;
        Ok(Self { factory, crf })
    }

    /// オンライン(確率的勾配)でCRFを学習します。
    ///
    /// サンプル順序はオプションのポリシー(シード付き乱数による復元抽出、
    /// または周回順)に従います。
    pub fn online_train(
        factory: FeatureFunctionFactory,
        data: &[TaggedWords],
        options: &OnlineOptions,
    ) -> Result<Self> {
        let prepared = prepare(&factory, data)?;
        let crf = online_train(&prepared, factory.layout().feature_functions_count(), options)?;
        Ok(Self { factory, crf })
    }

    /// 学習済みの重みベクトルと既存のファクトリから分類器を再構成します。
    ///
    /// # エラー
    ///
    /// 重みベクトルの長さが素性配置と一致しない場合、状態エラーが返され
    /// ます。
    pub fn from_weights(factory: FeatureFunctionFactory, weights: Vec<f64>) -> Result<Self> {
        let expected = factory.layout().feature_functions_count();
        if weights.len() != expected {
            return Err(LegatoError::invalid_state(
                "weight vector length does not match the feature layout",
                format!("expected {expected}, got {}", weights.len()),
            ));
        }
        Ok(Self {
            factory,
            crf: LinearChainCrf::new(weights),
        })
    }

    /// 素性関数ファクトリを返します。
    pub fn factory(&self) -> &FeatureFunctionFactory {
        &self.factory
    }

    /// ファクトリを差し替えた分類器を返します。
    ///
    /// 重みベクトルはそのまま引き継ぎます。新しい素性配置との整合性
    /// チェックは次の利用時に行われます。
    pub(crate) fn rebind(self, factory: FeatureFunctionFactory) -> Self {
        Self {
            factory,
            crf: self.crf,
        }
    }

    /// CRFを返します。
    pub fn crf(&self) -> &LinearChainCrf {
        &self.crf
    }

    fn check_layout(&self) -> Result<()> {
        let expected = self.factory.layout().feature_functions_count();
        if self.crf.weights().len() != expected {
            return Err(LegatoError::invalid_state(
                "weight vector length does not match the feature layout",
                format!("expected {expected}, got {}", self.crf.weights().len()),
            ));
        }
        Ok(())
    }

    fn provider(&self, words: &Arc<[SyllabicWord]>) -> Result<Arc<SentenceProvider>> {
        if words.is_empty() {
            return Err(LegatoError::invalid_argument(
                "words",
                "the word sequence must not be empty",
            ));
        }
        self.check_layout()?;
        Ok(self.factory.provider(words))
    }

    /// 最尤タグ経路をデコードします。
    ///
    /// # 戻り値
    ///
    /// タグ列。バイグラム制約が有効な経路を1つも許さない場合は `None`
    pub fn decode(&self, words: &Arc<[SyllabicWord]>) -> Result<Option<Vec<Tag>>> {
        let provider = self.provider(words)?;
        Ok(self
            .crf
            .decode(provider.as_ref())
            .map(|(labels, _)| labels.into_iter().map(|l| Tag(l as u16)).collect()))
    }

    /// 最尤タグ経路とその経路確率を返します。
    pub fn decode_with_probability(
        &self,
        words: &Arc<[SyllabicWord]>,
    ) -> Result<Option<(Vec<Tag>, f64)>> {
        let provider = self.provider(words)?;
        Ok(self
            .crf
            .decode_with_probability(provider.as_ref())
            .map(|(labels, p)| {
                (
                    labels.into_iter().map(|l| Tag(l as u16)).collect::<Vec<Tag>>(),
                    p,
                )
            }))
    }

    /// デコードしたタグ経路からレンマを再構成します。
    ///
    /// 各位置について、勝者タグのスコアに現れる相異なる変換クラスの中から
    /// `score × unigram重み[id] + unigramバイアス重み[id]` を最大化する
    /// クラスを選び(同点は先に列挙された候補)、そのコマンド列を語形に
    /// 適用してレンマを得ます。候補クラスが存在しない位置では、表層形が
    /// そのままレンマになります。
    ///
    /// # 戻り値
    ///
    /// レンマ列。デコードが不可能な場合は `None`
    pub fn lemmatize(&self, words: &Arc<[SyllabicWord]>) -> Result<Option<Vec<String>>> {
        let provider = self.provider(words)?;
        let decoded = match self.crf.decode(provider.as_ref()) {
            Some((labels, _)) => labels,
            None => return Ok(None),
        };

        let weights = self.crf.weights();
        let layout = self.factory.layout();
        let tag_set = provider.tag_set();
        let syllabizer = self.factory.syllabizer();
        let mut lemmata = Vec::with_capacity(words.len());
        for (pos, &label) in decoded.iter().enumerate() {
            let tag = Tag(label as u16);
            let word = &words[pos];
            let bank = provider.score_bank_at(pos);

            let mut best: Option<(usize, f64)> = None;
            let mut candidates = vec![];
            let mut seen = HashSet::new();
            for score in bank.scores(tag, provider.policy(), tag_set) {
                let class = score.feature().class();
                if !seen.insert(Arc::as_ptr(class)) {
                    continue;
                }
                let id = score.feature().id();
                let weight = score.value() * weights[layout.unigram_indicators_offset() + id]
                    + weights[layout.unigram_biases_offset() + id];
                let index = candidates.len();
                candidates.push(class.clone());
                // Strictly-greater comparison keeps the earliest candidate on
                // ties.
                if best.map_or(true, |(_, w)| weight > w) {
                    best = Some((index, weight));
                }
            }

            let lemma = best
                .and_then(|(index, _)| candidates[index].sequence().apply_to_word(word))
                .map(|lemma| syllabizer.reassemble(lemma.syllables()))
                .unwrap_or_else(|| syllabizer.reassemble(word.syllables()));
            lemmata.push(lemma);
        }
        Ok(Some(lemmata))
    }
}

fn prepare(
    factory: &FeatureFunctionFactory,
    data: &[TaggedWords],
) -> Result<Vec<(SentenceProvider, Vec<u32>)>> {
    let mut prepared = Vec::with_capacity(data.len());
    for (words, tags) in data {
        if words.len() != tags.len() {
            return Err(LegatoError::invalid_argument(
                "data",
                "each sentence must pair one tag with every word",
            ));
        }
        if words.is_empty() {
            continue;
        }
        let provider = factory.training_provider(words);
        let gold = tags.iter().map(|t| u32::from(t.id())).collect();
        prepared.push((provider, gold));
    }
    Ok(prepared)
}
