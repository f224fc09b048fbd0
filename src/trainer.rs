//! 学習オーケストレータ
//!
//! このモジュールは、言語リソース全体の学習と検証を編成します。学習は
//! 厳密な依存順で進みます。
//!
//! 1. 語形分類器バンクの学習(通常学習または交差検証付き学習)
//! 2. (オプション)語形類推辞書の構築
//! 3. タグ付き学習文からのタグバイグラム表の採掘
//! 4. 系列モデル(CRF)の学習
//!
//! 系列モデルの学習は学習済みの語形分類器バンクを、類推スコアリングは
//! 構築済みの類推辞書を前提とし、前提が欠けている場合は状態エラーで
//! 失敗します。
//!
//! # 使用例
//!
//! ```
//! use std::sync::Arc;
//!
//! use legato::lang::{CharSyllabizer, WhitespaceSentenceBreaker};
//! use legato::tag::TagSetBuilder;
//! use legato::trainer::{Corpus, Trainer, TrainerOptions};
//! use legato::LanguageResource;
//!
//! let mut tags = TagSetBuilder::new();
//! let open = tags.add_type("open", false)?;
//! tags.add_tag("NOUN", open)?;
//! tags.add_tag("VERB", open)?;
//! let tag_set = Arc::new(tags.build());
//!
//! let corpus_text = "cats\tcat\tNOUN\nrun\trun\tVERB\nEOS\n\
//!                    dogs\tdog\tNOUN\nrun\trun\tVERB\nEOS\n";
//! let corpus = Corpus::from_reader(corpus_text.as_bytes())?;
//!
//! let mut resource = LanguageResource::new(
//!     Arc::new(CharSyllabizer),
//!     Arc::new(WhitespaceSentenceBreaker),
//!     tag_set,
//! );
//! let trainer = Trainer::new(TrainerOptions::default());
//! trainer.train(&mut resource, &corpus)?;
//!
//! let lemmata = resource.lemmatize_text("cats run")?;
//! assert!(lemmata.is_some());
//! # Ok::<(), legato::errors::LegatoError>(())
//! ```

mod corpus;

use std::sync::Arc;

use hashbrown::{HashMap, HashSet};
use serde::{Deserialize, Serialize};

use crate::analogy::{normalized_edit_distance, WordFormsDictionary};
use crate::classifier::{TrainingSample, WordClassifierBank};
use crate::crf::{OfflineOptions, OnlineOptions};
use crate::errors::{LegatoError, Result};
use crate::features::{BigramTable, FeatureFunctionFactory};
use crate::resource::LanguageResource;
use crate::score::{AnalogyOptions, ScorePolicy};
use crate::svm::SvmOptions;
use crate::tag::{Tag, TagSet};
use crate::tagger::SentenceClassifier;
use crate::transform::derive_class;
use crate::word::SyllabicWord;

pub use crate::trainer::corpus::{Corpus, Example, Token};

/// 学習ソースの抽象
///
/// 学習ソースの走査は並列処理の開始前に一度だけ、先行評価で行われます。
pub trait TrainingSource {
    /// (表層形, レンマ, タグ名) の語レコードを返します。
    fn word_records(&self) -> Vec<Token>;

    /// タグ付きの文を返します。
    fn tagged_sentences(&self) -> Vec<Vec<Token>>;
}

/// 交差検証のオプション
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CrossValidationOptions {
    /// SVMオプションのグリッド
    pub grid: Vec<SvmOptions>,

    /// フォールド数
    pub folds: usize,
}

/// CRF学習のモード
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum CrfTrainingOptions {
    /// 全バッチ勾配によるオフライン学習
    Offline(OfflineOptions),

    /// 確率的勾配によるオンライン学習
    Online(OnlineOptions),
}

/// 学習オーケストレータのオプション
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrainerOptions {
    /// 分類器を学習する最小クラス頻度
    pub word_dropout: f64,

    /// 負例の間引き間隔
    pub decimation: usize,

    /// バイグラムを保持する最小出現頻度(全バイグラム出現数に対する割合)
    pub bigram_dropout: f64,

    /// 並列度。0は全コアを意味します
    pub parallelism: usize,

    /// スコア取得ポリシー
    pub policy: ScorePolicy,

    /// 学習後に辞書素性IDを凝縮モードへ切り替えるかどうか
    pub condense_dictionary: bool,

    /// SVMの学習オプション(交差検証を使わない場合)
    pub svm: SvmOptions,

    /// 交差検証のオプション。`None` の場合は通常学習です
    pub cross_validation: Option<CrossValidationOptions>,

    /// 類推強化のオプション。`Some` の場合は類推辞書が構築されます
    pub analogy: Option<AnalogyOptions>,

    /// CRF学習のモード
    pub crf: CrfTrainingOptions,
}

impl Default for TrainerOptions {
    fn default() -> Self {
        Self {
            word_dropout: 0.001,
            decimation: 1,
            bigram_dropout: 0.0,
            parallelism: 0,
            policy: ScorePolicy::Mixed,
            condense_dictionary: false,
            svm: SvmOptions::default(),
            cross_validation: None,
            analogy: None,
            crf: CrfTrainingOptions::Offline(OfflineOptions::default()),
        }
    }
}

/// 学習オーケストレータ
pub struct Trainer {
    options: TrainerOptions,
}

impl Trainer {
    /// オーケストレータを作成します。
    pub fn new(options: TrainerOptions) -> Self {
        Self { options }
    }

    /// オプションを返します。
    pub fn options(&self) -> &TrainerOptions {
        &self.options
    }

    /// リソース全体を依存順に学習します。
    ///
    /// # 引数
    ///
    /// * `resource` - 学習対象のリソース
    /// * `source` - 学習ソース
    pub fn train<S>(&self, resource: &mut LanguageResource, source: &S) -> Result<()>
    where
        S: TrainingSource,
    {
        self.train_word_layer(resource, source)?;
        if self.options.analogy.is_some() {
            self.build_forms_dictionary(resource, source)?;
        }
        self.train_sentence_layer(resource, source)?;
        Ok(())
    }

    /// 語層(分類器バンク)だけを学習します。
    pub fn train_word_layer<S>(&self, resource: &mut LanguageResource, source: &S) -> Result<()>
    where
        S: TrainingSource,
    {
        let samples = self.word_samples(resource, source)?;
        if samples.is_empty() {
            return Err(LegatoError::insufficient_data(
                "the training source yields no word records",
                "provide tagged (word, lemma) records",
            ));
        }
        let tag_set = Arc::clone(resource.tag_set());
        let bank = match &self.options.cross_validation {
            Some(cv) => WordClassifierBank::optimal_train(
                tag_set,
                &samples,
                &cv.grid,
                cv.folds,
                self.options.word_dropout,
                self.options.decimation,
                self.options.parallelism,
            )?,
            None => WordClassifierBank::train(
                tag_set,
                &samples,
                &self.options.svm,
                self.options.word_dropout,
                self.options.decimation,
                self.options.parallelism,
            )?,
        };
        let bank = if self.options.condense_dictionary {
            bank.with_dictionary_condensed(true)?
        } else {
            bank
        };
        resource.set_bank(Arc::new(bank));
        Ok(())
    }

    /// 語形類推辞書だけを構築します。
    ///
    /// 学習ソースの全既知語形(表層形)から一括構築されます。
    pub fn build_forms_dictionary<S>(
        &self,
        resource: &mut LanguageResource,
        source: &S,
    ) -> Result<()>
    where
        S: TrainingSource,
    {
        let syllabizer = Arc::clone(resource.syllabizer());
        let mut seen = HashSet::new();
        let mut words = vec![];
        for record in source.word_records() {
            let word = syllabizer.segment(&record.surface);
            if seen.insert(word.clone()) {
                words.push(word);
            }
        }
        if words.is_empty() {
            return Err(LegatoError::insufficient_data(
                "the training source yields no word forms",
                "provide word records before building the analogy dictionary",
            ));
        }
        let distance = |a: &SyllabicWord, b: &SyllabicWord| {
            normalized_edit_distance(a, b, syllabizer.as_ref())
        };
        let forms = WordFormsDictionary::bulk(words, &distance);
        log::info!("built the word-forms dictionary with {} forms", forms.len());
        resource.set_forms(Arc::new(forms));
        Ok(())
    }

    /// 文層(系列モデル)だけを学習します。
    ///
    /// # エラー
    ///
    /// 語形分類器バンクが未学習の場合、および類推スコアリングが要求されて
    /// いるのに類推辞書が存在しない場合、状態エラーが返されます。
    pub fn train_sentence_layer<S>(
        &self,
        resource: &mut LanguageResource,
        source: &S,
    ) -> Result<()>
    where
        S: TrainingSource,
    {
        let bank = resource.bank().cloned().ok_or_else(|| {
            LegatoError::invalid_state(
                "sequence-model training requires a trained word-classifier bank",
                "train the word layer first",
            )
        })?;
        if self.options.analogy.is_some() && resource.forms().is_none() {
            return Err(LegatoError::invalid_state(
                "analogy scoring requested",
                "the word-forms dictionary has not been built",
            ));
        }
        let sentences = self.typed_sentences(resource, source)?;
        if sentences.is_empty() {
            return Err(LegatoError::insufficient_data(
                "the training source yields no sentences",
                "provide tagged sentences",
            ));
        }
        let bigrams = mine_bigrams(&sentences, resource.tag_set(), self.options.bigram_dropout)?;
        log::info!("mined {} tag bigrams", bigrams.len());
        let factory = FeatureFunctionFactory::new(
            bank,
            resource.forms().cloned(),
            Arc::clone(resource.syllabizer()),
            Arc::new(bigrams),
            self.options.policy,
            self.options.analogy.clone(),
        )?;
        let classifier = match &self.options.crf {
            CrfTrainingOptions::Offline(options) => {
                SentenceClassifier::offline_train(factory, &sentences, options)?
            }
            CrfTrainingOptions::Online(options) => {
                SentenceClassifier::online_train(factory, &sentences, options)?
            }
        };
        resource.set_sentence(classifier);
        Ok(())
    }

    /// 語層を検証します。
    pub fn validate_word_layer<S>(&self, resource: &LanguageResource, source: &S) -> Result<f64>
    where
        S: TrainingSource,
    {
        let samples = self.word_samples(resource, source)?;
        resource.validate_word_layer(&samples, self.options.parallelism)
    }

    /// 文層を検証します。
    pub fn validate_sentence_layer<S>(
        &self,
        resource: &LanguageResource,
        source: &S,
    ) -> Result<f64>
    where
        S: TrainingSource,
    {
        let sentences = self.typed_sentences(resource, source)?;
        resource.validate_sentence_layer(&sentences)
    }

    // Eager, single-pass conversion of the source's word records into typed
    // training samples.
    fn word_samples<S>(
        &self,
        resource: &LanguageResource,
        source: &S,
    ) -> Result<Vec<TrainingSample>>
    where
        S: TrainingSource,
    {
        let syllabizer = resource.syllabizer();
        let interner = resource.interner();
        let mut samples = vec![];
        for record in source.word_records() {
            let tag = resolve_tag(resource.tag_set(), &record.tag)?;
            let word = syllabizer.segment(&record.surface);
            let lemma = syllabizer.segment(&record.lemma);
            let class = derive_class(&word, &lemma, tag, syllabizer.as_ref(), interner);
            samples.push(TrainingSample::new(word, class));
        }
        Ok(samples)
    }

    fn typed_sentences<S>(
        &self,
        resource: &LanguageResource,
        source: &S,
    ) -> Result<Vec<(Vec<SyllabicWord>, Vec<Tag>)>>
    where
        S: TrainingSource,
    {
        let syllabizer = resource.syllabizer();
        let mut sentences = vec![];
        for tokens in source.tagged_sentences() {
            let mut words = Vec::with_capacity(tokens.len());
            let mut tags = Vec::with_capacity(tokens.len());
            for token in &tokens {
                words.push(syllabizer.segment(&token.surface));
                tags.push(resolve_tag(resource.tag_set(), &token.tag)?);
            }
            sentences.push((words, tags));
        }
        Ok(sentences)
    }
}

fn resolve_tag(tag_set: &TagSet, name: &str) -> Result<Tag> {
    let tag = tag_set
        .tag(name)
        .ok_or_else(|| LegatoError::invalid_format("corpus", format!("unknown tag: {name}")))?;
    if tag_set.is_boundary(tag) {
        return Err(LegatoError::invalid_format(
            "corpus",
            format!("boundary tag in training data: {name}"),
        ));
    }
    Ok(tag)
}

/// タグ付き文からタグバイグラム表を採掘します。
///
/// 各文の暗黙の文頭・文末境界タグを含めてバイグラムを数え、全出現数に
/// 対する割合がドロップアウト閾値以上のバイグラムだけを保持します。
/// インデックスは初出順に割り当てられます。
///
/// # 引数
///
/// * `sentences` - タグ付きの文
/// * `tag_set` - タグ集合
/// * `dropout` - 保持する最小出現頻度
pub fn mine_bigrams(
    sentences: &[(Vec<SyllabicWord>, Vec<Tag>)],
    tag_set: &TagSet,
    dropout: f64,
) -> Result<BigramTable> {
    if !dropout.is_finite() || !(0.0..1.0).contains(&dropout) {
        return Err(LegatoError::invalid_argument(
            "dropout",
            "the bigram dropout fraction must lie in [0, 1)",
        ));
    }
    let bos = tag_set.bos();
    let eos = tag_set.eos();
    let mut counts: HashMap<(Tag, Tag), usize> = HashMap::new();
    let mut order = vec![];
    let mut total = 0usize;
    let mut count = |pair: (Tag, Tag), order: &mut Vec<(Tag, Tag)>| {
        let entry = counts.entry(pair).or_insert(0);
        if *entry == 0 {
            order.push(pair);
        }
        *entry += 1;
    };
    for (_, tags) in sentences {
        if tags.is_empty() {
            continue;
        }
        total += tags.len() + 1;
        count((bos, tags[0]), &mut order);
        for pair in tags.windows(2) {
            count((pair[0], pair[1]), &mut order);
        }
        count((tags[tags.len() - 1], eos), &mut order);
    }
    let threshold = dropout * total as f64;
    Ok(BigramTable::from_pairs(
        order
            .into_iter()
            .filter(|pair| counts[pair] as f64 >= threshold),
    ))
}
