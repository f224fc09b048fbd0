//! 言語ごとの推論リソース
//!
//! このモジュールは、1つの言語設定のために構築される推論リソース
//! ([`LanguageResource`])を提供します。リソースは語形分類器バンク、
//! オプションの語形類推辞書、および文分類器(CRF)を所有します。
//! 言語ごとに一度だけ作成され、学習または読み込みの後はほぼ読み取り
//! 専用で使用されます。学習後の変更は、分類器バンクの素性ID採番モード
//! の切り替えと類推辞書の差し込みだけです。
//!
//! グローバルな言語レジストリは存在しません。このリソース自体が、学習
//! と推論のエントリポイントへ明示的に渡されるコンテキストオブジェクト
//! です。

use std::sync::Arc;

use crate::analogy::WordFormsDictionary;
use crate::classifier::{TrainingSample, WordClassifierBank};
use crate::errors::{LegatoError, Result};
use crate::features::FeatureFunctionFactory;
use crate::lang::{SentenceBreaker, Syllabizer};
use crate::tag::{Tag, TagSet};
use crate::tagger::SentenceClassifier;
use crate::transform::TransformInterner;
use crate::word::SyllabicWord;

/// 言語ごとの推論リソース
pub struct LanguageResource {
    syllabizer: Arc<dyn Syllabizer>,
    breaker: Arc<dyn SentenceBreaker>,
    tag_set: Arc<TagSet>,
    interner: Arc<TransformInterner>,
    bank: Option<Arc<WordClassifierBank>>,
    forms: Option<Arc<WordFormsDictionary>>,
    sentence: Option<SentenceClassifier>,
}

impl LanguageResource {
    /// 未学習のリソースを作成します。
    ///
    /// # 引数
    ///
    /// * `syllabizer` - 言語の音節化器
    /// * `breaker` - 言語の文分割器
    /// * `tag_set` - 言語のタグ集合
    pub fn new(
        syllabizer: Arc<dyn Syllabizer>,
        breaker: Arc<dyn SentenceBreaker>,
        tag_set: Arc<TagSet>,
    ) -> Self {
        Self {
            syllabizer,
            breaker,
            tag_set,
            interner: Arc::new(TransformInterner::new()),
            bank: None,
            forms: None,
            sentence: None,
        }
    }

    /// 音節化器を返します。
    pub fn syllabizer(&self) -> &Arc<dyn Syllabizer> {
        &self.syllabizer
    }

    /// タグ集合を返します。
    pub fn tag_set(&self) -> &Arc<TagSet> {
        &self.tag_set
    }

    /// 変換のインターナーを返します。
    pub fn interner(&self) -> &Arc<TransformInterner> {
        &self.interner
    }

    /// 語形分類器バンクを返します。
    pub fn bank(&self) -> Option<&Arc<WordClassifierBank>> {
        self.bank.as_ref()
    }

    /// 語形類推辞書を返します。
    pub fn forms(&self) -> Option<&Arc<WordFormsDictionary>> {
        self.forms.as_ref()
    }

    /// 文分類器を返します。
    pub fn sentence_classifier(&self) -> Option<&SentenceClassifier> {
        self.sentence.as_ref()
    }

    pub(crate) fn set_bank(&mut self, bank: Arc<WordClassifierBank>) {
        self.bank = Some(bank);
    }

    pub(crate) fn set_forms(&mut self, forms: Arc<WordFormsDictionary>) {
        self.forms = Some(forms);
    }

    pub(crate) fn set_sentence(&mut self, sentence: SentenceClassifier) {
        self.sentence = Some(sentence);
    }

    /// 表層形を語形に変換します。
    pub fn word(&self, surface: &str) -> SyllabicWord {
        self.syllabizer.segment(surface)
    }

    /// 語列を共有可能な文オブジェクトにします。
    ///
    /// 同じ文オブジェクトでの繰り返し推論は、プロバイダの同一性キャッシュ
    /// によって償却されます。
    pub fn sentence(&self, words: Vec<SyllabicWord>) -> Arc<[SyllabicWord]> {
        words.into()
    }

    fn trained_sentence_classifier(&self) -> Result<&SentenceClassifier> {
        self.sentence.as_ref().ok_or_else(|| {
            LegatoError::invalid_state(
                "the sentence classifier has not been trained",
                "train the sequence layer first",
            )
        })
    }

    /// 語列に最尤タグ列を付与します。
    ///
    /// # 戻り値
    ///
    /// タグ列。バイグラム制約が有効な経路を許さない場合は `None`
    ///
    /// # エラー
    ///
    /// 文分類器が未学習の場合、状態エラーが返されます。
    pub fn tags(&self, words: &Arc<[SyllabicWord]>) -> Result<Option<Vec<Tag>>> {
        self.trained_sentence_classifier()?.decode(words)
    }

    /// 語列に最尤タグ列とその経路確率を付与します。
    pub fn tags_with_probability(
        &self,
        words: &Arc<[SyllabicWord]>,
    ) -> Result<Option<(Vec<Tag>, f64)>> {
        self.trained_sentence_classifier()?
            .decode_with_probability(words)
    }

    /// 語列のレンマ列を推論します。
    pub fn lemmata(&self, words: &Arc<[SyllabicWord]>) -> Result<Option<Vec<String>>> {
        self.trained_sentence_classifier()?.lemmatize(words)
    }

    /// 生テキストを文分割・音節化してレンマ列を推論します。
    ///
    /// テキストに語が1つも含まれない場合は空のレンマ列を返します。
    pub fn lemmatize_text(&self, text: &str) -> Result<Option<Vec<String>>> {
        let words: Vec<SyllabicWord> = self
            .breaker
            .break_text(text)
            .iter()
            .map(|w| self.syllabizer.segment(w))
            .collect();
        if words.is_empty() {
            return Ok(Some(vec![]));
        }
        self.lemmata(&self.sentence(words))
    }

    /// 語層を検証します。
    ///
    /// 分類器ごとの均衡正解率の非加重平均を返します。
    pub fn validate_word_layer(
        &self,
        samples: &[TrainingSample],
        parallelism: usize,
    ) -> Result<f64> {
        let bank = self.bank.as_ref().ok_or_else(|| {
            LegatoError::invalid_state(
                "the word classifier bank has not been trained",
                "train the word layer first",
            )
        })?;
        bank.validate(samples, parallelism)
    }

    /// 文層を検証します。
    ///
    /// デコードしたタグ列と正解タグ列の一致率(語単位)を返します。
    /// デコード不能な文の語はすべて不一致として数えられます。
    ///
    /// # エラー
    ///
    /// 検証データが文も語も含まない場合、データ不足エラーが返されます。
    pub fn validate_sentence_layer(
        &self,
        sentences: &[(Vec<SyllabicWord>, Vec<Tag>)],
    ) -> Result<f64> {
        let classifier = self.trained_sentence_classifier()?;
        if sentences.is_empty() {
            return Err(LegatoError::insufficient_data(
                "the validation set contains no sentences",
                "provide at least one tagged sentence",
            ));
        }
        let mut total = 0usize;
        let mut correct = 0usize;
        for (words, gold) in sentences {
            if words.is_empty() {
                continue;
            }
            total += gold.len();
            let words: Arc<[SyllabicWord]> = words.clone().into();
            if let Some(tags) = classifier.decode(&words)? {
                correct += tags.iter().zip(gold).filter(|(a, b)| a == b).count();
            }
        }
        if total == 0 {
            return Err(LegatoError::insufficient_data(
                "the validation set contains no words",
                "provide non-empty sentences",
            ));
        }
        Ok(correct as f64 / total as f64)
    }

    /// 辞書素性IDの採番モードを切り替えます。
    ///
    /// 再採番したバンクのスナップショットを作成して差し替えます。文分類器
    /// が存在する場合は素性関数ファクトリも新しいバンクで再構成されます。
    /// 採番モードの変更で素性配置の大きさが変わった場合、既存の重み
    /// ベクトルとの整合性チェックはデコード時に行われます。
    ///
    /// # エラー
    ///
    /// バンクが未学習の場合は状態エラー、凝縮から展開への復元でクラスの
    /// 元IDが見つからない場合も状態エラーが返されます。
    pub fn set_dictionary_features_condensed(&mut self, condensed: bool) -> Result<()> {
        let bank = self.bank.as_ref().ok_or_else(|| {
            LegatoError::invalid_state(
                "the word classifier bank has not been trained",
                "train the word layer first",
            )
        })?;
        let bank = Arc::new(bank.with_dictionary_condensed(condensed)?);
        self.bank = Some(Arc::clone(&bank));
        if let Some(classifier) = self.sentence.take() {
            let old = classifier.factory();
            let factory = FeatureFunctionFactory::new(
                Arc::clone(&bank),
                old.forms().cloned(),
                Arc::clone(&self.syllabizer),
                Arc::clone(old.bigrams()),
                old.policy(),
                old.analogy().cloned(),
            )?;
            self.sentence = Some(classifier.rebind(factory));
        }
        Ok(())
    }
}
