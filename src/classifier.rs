//! 語形分類器バンク
//!
//! このモジュールは、変換クラスごとの二値分類器の集まりと、例外クラス用の
//! 完全一致辞書を束ねた[`WordClassifierBank`]を提供します。通常学習
//! ([`WordClassifierBank::train`])と交差検証付き学習
//! ([`WordClassifierBank::optimal_train`])、および2種類の素性ID採番
//! モード(展開/凝縮)の切り替えをサポートします。
//!
//! 素性IDは大域重みベクトル内の座標です。凝縮モードでは、同じタグを共有
//! するすべての例外クラスがタグごとの1つのIDに畳み込まれます。切り替えは
//! 共有オブジェクトのその場書き換えではなく、再採番した新しいバンクの
//! スナップショットを生成することで行います。

mod partition;

use std::sync::{Arc, Mutex};

use hashbrown::{HashMap, HashSet};
use rayon::prelude::*;

use crate::analogy::{normalized_edit_distance, WordFormsDictionary};
use crate::errors::{LegatoError, Result};
use crate::lang::Syllabizer;
use crate::score::{AnalogyOptions, DictionaryOption, Score, ScoreBank, DICTIONARY_SCORE};
use crate::svm::{KernelSvm, SvmOptions};
use crate::tag::{Tag, TagSet, TagTypeId};
use crate::transform::ClassRef;
use crate::word::SyllabicWord;

pub(crate) use crate::classifier::partition::partition;

/// タグ付き語形の学習サンプル
///
/// 語形と変換クラスの対です。等価性とハッシュは両フィールドから計算され、
/// 重複はクラス分割の前に畳み込まれます。
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct TrainingSample {
    word: SyllabicWord,
    class: ClassRef,
}

impl TrainingSample {
    /// 新しいサンプルを作成します。
    pub fn new(word: SyllabicWord, class: ClassRef) -> Self {
        Self { word, class }
    }

    /// 語形を返します。
    pub fn word(&self) -> &SyllabicWord {
        &self.word
    }

    /// 変換クラスを返します。
    pub fn class(&self) -> &ClassRef {
        &self.class
    }
}

/// 語の素性
///
/// IDは大域重みベクトル内のこの素性の座標です。IDの変更は採番モード
/// 切り替えによる再採番スナップショットでのみ起こります。
#[derive(Clone, Debug)]
pub struct WordFeature {
    id: usize,
    class: ClassRef,
}

impl WordFeature {
    fn new(id: usize, class: ClassRef) -> Self {
        Self { id, class }
    }

    /// 素性IDを返します。
    pub fn id(&self) -> usize {
        self.id
    }

    /// 変換クラスを返します。
    pub fn class(&self) -> &ClassRef {
        &self.class
    }
}

/// 1つの変換クラスに対する語形分類器
///
/// 状態を持たないスコア関数です。正のスコアはこの素性のクラスへの所属を
/// 意味します。
#[derive(Clone, Debug)]
pub struct WordClassifier {
    feature: WordFeature,
    svm: KernelSvm,
}

impl WordClassifier {
    /// 素性を返します。
    pub fn feature(&self) -> &WordFeature {
        &self.feature
    }

    /// 語形のスコアを計算します。
    pub fn score(&self, word: &SyllabicWord) -> f64 {
        self.svm.score(word)
    }

    /// 学習時のSVMオプションを返します。
    pub fn svm_options(&self) -> &SvmOptions {
        self.svm.options()
    }
}

/// 語形分類器バンク
///
/// 素性ID順の分類器の列と、例外クラス用の語形→素性のマルチマップを保持
/// します。辞書素性IDの採番モード(展開/凝縮)と、相異なる素性IDの総数を
/// 追跡します。
#[derive(Clone)]
pub struct WordClassifierBank {
    tag_set: Arc<TagSet>,
    classifiers: Vec<WordClassifier>,
    classifier_classes: HashSet<ClassRef>,
    dictionary: HashMap<SyllabicWord, Vec<ClassRef>>,
    dict_features: HashMap<ClassRef, WordFeature>,

    // Original expanded ids, retained so that a condensed bank can be
    // restored exactly.
    expanded_ids: HashMap<ClassRef, usize>,

    condensed: bool,
    feature_ids_count: usize,
}

impl WordClassifierBank {
    /// サンプルから分類器バンクを学習します。
    ///
    /// サンプルを頻出クラスと例外クラスに分割し、頻出クラスごとに1つの
    /// 二値SVMを並列に学習します。クラスごとの学習集合は、そのクラスの
    /// 全正例と、負例プールから間引き間隔ごとに取った負例です。ただし
    /// そのクラスの正例として同じ語形が出現する負例(同形異義語)は除外
    /// されます。例外クラスのサンプルは完全一致辞書に登録されます。
    ///
    /// # 引数
    ///
    /// * `tag_set` - タグ集合
    /// * `samples` - 学習サンプル(重複はここで畳み込まれます)
    /// * `options` - SVMの学習オプション
    /// * `dropout` - 頻出とみなす最小クラス頻度
    /// * `decimation` - 負例の間引き間隔
    /// * `parallelism` - 並列度。0は全コアを意味します
    ///
    /// # エラー
    ///
    /// 引数が事前条件を満たさない場合、[`LegatoError`]が返されます。
    pub fn train(
        tag_set: Arc<TagSet>,
        samples: &[TrainingSample],
        options: &SvmOptions,
        dropout: f64,
        decimation: usize,
        parallelism: usize,
    ) -> Result<Self> {
        validate_word_training_args(dropout, decimation)?;
        let samples = dedup_samples(samples);
        let parts = partition(&samples, dropout, &tag_set);

        let pool = thread_pool(parallelism)?;
        let classifiers: Vec<WordClassifier> = pool.install(|| {
            parts
                .common
                .par_iter()
                .enumerate()
                .map(|(id, group)| {
                    let (positives, negatives) =
                        class_training_set(group.samples.as_slice(), &group.class, &samples, decimation);
                    let svm = KernelSvm::train(&positives, &negatives, options);
                    WordClassifier {
                        feature: WordFeature::new(id, group.class.clone()),
                        svm,
                    }
                })
                .collect()
        });

        log::info!(
            "trained {} classifiers, {} dictionary-only classes",
            parts.common_count(),
            parts.exceptional_count()
        );
        Ok(Self::assemble(tag_set, classifiers, &parts))
    }

    /// 交差検証でSVMオプションを選択しながらバンクを学習します。
    ///
    /// クラスごとに、オプショングリッドの各候補をK分割交差検証で評価
    /// します。フォールド `f` は、インデックスが `f` (mod `fold_count`) の
    /// サンプルのうち、クラスが一致するか語形が正例と重複しないものを
    /// 検証に使い、それ以外のインデックスの同条件のサンプルで学習します。
    /// 適合度は均衡正解率(片側が空のフォールドでは通常の正解率)を、
    /// 評価可能なフォールドで平均した値です。最良候補は平均適合度が
    /// 厳密に最大となる最初のグリッド要素で、勝者は間引き済みの完全な
    /// クラス別学習集合で改めて学習されます。
    ///
    /// # エラー
    ///
    /// グリッドが空の場合やフォールド数が不正な場合は引数エラー、ある
    /// クラスで評価可能なフォールドが1つもない場合はデータ不足エラーが
    /// 返されます。
    pub fn optimal_train(
        tag_set: Arc<TagSet>,
        samples: &[TrainingSample],
        options_grid: &[SvmOptions],
        fold_count: usize,
        dropout: f64,
        decimation: usize,
        parallelism: usize,
    ) -> Result<Self> {
        validate_word_training_args(dropout, decimation)?;
        if options_grid.is_empty() {
            return Err(LegatoError::invalid_argument(
                "options_grid",
                "the option grid must not be empty",
            ));
        }
        if fold_count < 2 {
            return Err(LegatoError::invalid_argument(
                "fold_count",
                "cross-validation requires at least two folds",
            ));
        }
        let samples = dedup_samples(samples);
        let parts = partition(&samples, dropout, &tag_set);

        let pool = thread_pool(parallelism)?;
        let classifiers: Result<Vec<WordClassifier>> = pool.install(|| {
            parts
                .common
                .par_iter()
                .enumerate()
                .map(|(id, group)| {
                    let best = select_best_options(
                        &group.class,
                        group.samples.as_slice(),
                        &samples,
                        options_grid,
                        fold_count,
                    )?;
                    let (positives, negatives) =
                        class_training_set(group.samples.as_slice(), &group.class, &samples, decimation);
                    let svm = KernelSvm::train(&positives, &negatives, best);
                    Ok(WordClassifier {
                        feature: WordFeature::new(id, group.class.clone()),
                        svm,
                    })
                })
                .collect()
        });
        Ok(Self::assemble(tag_set, classifiers?, &parts))
    }

    fn assemble(
        tag_set: Arc<TagSet>,
        classifiers: Vec<WordClassifier>,
        parts: &partition::Partition,
    ) -> Self {
        let classifier_classes = classifiers
            .iter()
            .map(|c| c.feature.class.clone())
            .collect();
        let mut dictionary: HashMap<SyllabicWord, Vec<ClassRef>> = HashMap::new();
        let mut dict_features = HashMap::new();
        let mut expanded_ids = HashMap::new();
        let offset = classifiers.len();
        for (k, group) in parts.exceptional.iter().enumerate() {
            let id = offset + k;
            dict_features.insert(group.class.clone(), WordFeature::new(id, group.class.clone()));
            expanded_ids.insert(group.class.clone(), id);
            for sample in &group.samples {
                let classes = dictionary.entry(sample.word.clone()).or_default();
                if !classes.iter().any(|c| Arc::ptr_eq(c, &group.class)) {
                    classes.push(group.class.clone());
                }
            }
        }
        let feature_ids_count = offset + parts.exceptional_count();
        Self {
            tag_set,
            classifiers,
            classifier_classes,
            dictionary,
            dict_features,
            expanded_ids,
            condensed: false,
            feature_ids_count,
        }
    }

    /// タグ集合を返します。
    pub fn tag_set(&self) -> &Arc<TagSet> {
        &self.tag_set
    }

    /// 分類器の列を素性ID順に返します。
    pub fn classifiers(&self) -> &[WordClassifier] {
        &self.classifiers
    }

    /// 相異なる素性IDの総数を返します。
    pub fn feature_ids_count(&self) -> usize {
        self.feature_ids_count
    }

    /// 辞書素性IDが凝縮モードの場合に `true` を返します。
    pub fn dictionary_features_condensed(&self) -> bool {
        self.condensed
    }

    /// 辞書クラス数を返します。
    pub fn dictionary_class_count(&self) -> usize {
        self.dict_features.len()
    }

    /// 採番モードを切り替えた新しいバンクのスナップショットを返します。
    ///
    /// 展開モードでは各例外クラスが分類器の後に続く固有のIDを保持し、
    /// 凝縮モードではタグを共有する例外クラスがタグごとの1つの共有IDに
    /// 畳み込まれます(共有IDは出現順に割り当て)。凝縮から展開への復元は
    /// 保持されたクラス→IDマップから行われます。
    ///
    /// # エラー
    ///
    /// 復元時にクラスが保持マップに見つからない場合、状態エラーが返され
    /// ます。
    pub fn with_dictionary_condensed(&self, condensed: bool) -> Result<Self> {
        if condensed == self.condensed {
            return Ok(self.clone());
        }
        let mut bank = self.clone();
        let offset = bank.classifiers.len();
        if condensed {
            // Shared ids are handed out first-come per tag, in expanded-id
            // order.
            let mut ordered: Vec<(ClassRef, usize)> = bank
                .expanded_ids
                .iter()
                .map(|(class, id)| (class.clone(), *id))
                .collect();
            ordered.sort_by_key(|(_, id)| *id);
            let mut shared: HashMap<Tag, usize> = HashMap::new();
            let mut next = offset;
            for (class, _) in ordered {
                let id = *shared.entry(class.tag()).or_insert_with(|| {
                    let id = next;
                    next += 1;
                    id
                });
                bank.dict_features
                    .insert(class.clone(), WordFeature::new(id, class));
            }
            bank.feature_ids_count = next;
        } else {
            let mut restored = HashMap::new();
            for class in bank.dict_features.keys() {
                let id = bank.expanded_ids.get(class).ok_or_else(|| {
                    LegatoError::invalid_state(
                        "cannot restore expanded dictionary feature ids",
                        "class missing from the retained id map",
                    )
                })?;
                restored.insert(class.clone(), WordFeature::new(*id, class.clone()));
            }
            bank.dict_features = restored;
            bank.feature_ids_count = offset + bank.expanded_ids.len();
        }
        bank.condensed = condensed;
        Ok(bank)
    }

    /// 語形のスコアバンクを計算します。
    ///
    /// すべての分類器を評価して正のスコアだけを残し、語形を辞書から引いて
    /// ヒットごとに固定スコア10.0を与えます。
    ///
    /// # 引数
    ///
    /// * `word` - 問い合わせ語形
    /// * `tag_type` - 指定時、この種別のタグを持つクラスに限定します
    /// * `dictionary` - 辞書参照の範囲
    pub fn score_bank(
        &self,
        word: &SyllabicWord,
        tag_type: Option<TagTypeId>,
        dictionary: DictionaryOption,
    ) -> ScoreBank {
        let mut bank = ScoreBank::new();
        for classifier in &self.classifiers {
            if let Some(tt) = tag_type {
                if self.tag_set.tag_type_of(classifier.feature.class.tag()) != tt {
                    continue;
                }
            }
            let value = classifier.score(word);
            if value > 0.0 {
                bank.push_classifier(Score::new(classifier.feature.clone(), value));
            }
        }
        if let Some(classes) = self.dictionary.get(word) {
            for class in classes {
                if let Some(tt) = tag_type {
                    if self.tag_set.tag_type_of(class.tag()) != tt {
                        continue;
                    }
                }
                if dictionary == DictionaryOption::Residual
                    && self.classifier_classes.contains(class)
                {
                    continue;
                }
                if let Some(feature) = self.dict_features.get(class) {
                    bank.push_dictionary(Score::new(feature.clone(), DICTIONARY_SCORE));
                }
            }
        }
        bank
    }

    /// 類推強化済みのスコアバンクを計算します。
    ///
    /// まず語形の基礎スコアバンクを計算し、設定された正規化編集距離の
    /// 上限を `max_normalized_distance - 1/max(len-1, 1)` により絶対半径へ
    /// 変換します(短い語では検索半径が縮みます)。半径内の既知語形の
    /// 近傍それぞれについて、同じ変換が同じレンマを導く場合に、減衰重み
    /// と近傍スコアの積を基礎スコアにその場で加算します。
    ///
    /// 非関連種別のタグを持つスコアは強化されず、問い合わせ語形自身は
    /// 近傍から除外されます。強化がスコアを減少させることはありません。
    ///
    /// # 引数
    ///
    /// * `word` - 問い合わせ語形
    /// * `forms` - 既知語形の類推検索辞書
    /// * `syllabizer` - 音節間距離を提供する音節化器
    /// * `options` - 類推強化のオプション
    /// * `dictionary` - 辞書参照の範囲
    pub fn analogy_score_bank(
        &self,
        word: &SyllabicWord,
        forms: &WordFormsDictionary,
        syllabizer: &dyn Syllabizer,
        options: &AnalogyOptions,
        dictionary: DictionaryOption,
    ) -> ScoreBank {
        let mut bank = self.score_bank(word, None, dictionary);
        let denom = word.len().saturating_sub(1).max(1) as f64;
        let radius = options.max_normalized_distance - 1.0 / denom;
        if radius <= 0.0 {
            return bank;
        }
        let distance =
            |a: &SyllabicWord, b: &SyllabicWord| normalized_edit_distance(a, b, syllabizer);
        let neighbors = forms.search(word, radius, &distance);
        if neighbors.is_empty() {
            return bank;
        }

        // Neighbor banks are cached per (neighbor, tag type) for the duration
        // of this call.
        let mut neighbor_banks: HashMap<(SyllabicWord, TagTypeId), ScoreBank> = HashMap::new();
        for (tag, score) in bank.all_scores_mut() {
            if self.tag_set.is_unrelated(tag) {
                continue;
            }
            let tag_type = self.tag_set.tag_type_of(tag);
            let implied = match score.feature().class().sequence().apply_to_word(word) {
                Some(lemma) => lemma.text(),
                None => continue,
            };
            let mut delta = 0.0;
            for (neighbor, d) in &neighbors {
                if neighbor == word {
                    continue;
                }
                let neighbor_bank = neighbor_banks
                    .entry((neighbor.clone(), tag_type))
                    .or_insert_with(|| self.score_bank(neighbor, Some(tag_type), dictionary));
                for (_, neighbor_score) in neighbor_bank.all_scores() {
                    let neighbor_lemma = neighbor_score
                        .feature()
                        .class()
                        .sequence()
                        .apply_to_word(neighbor);
                    if let Some(lemma) = neighbor_lemma {
                        if lemma.text() == implied {
                            delta += options.falloff.weight(*d) * neighbor_score.value();
                        }
                    }
                }
            }
            score.reinforce(delta);
        }
        bank
    }

    /// 検証サンプルに対して分類器ごとの均衡正解率を並列に計算し、その
    /// 非加重平均を返します。
    ///
    /// 各分類器について、クラスが一致するサンプルを正例、それ以外を負例
    /// とします。ただしそのクラスの正例として同じ語形が出現する負例は
    /// 除外されます。
    ///
    /// # エラー
    ///
    /// 検証サンプルが空の場合やバンクが分類器を持たない場合、データ不足
    /// エラーが返されます。
    pub fn validate(&self, samples: &[TrainingSample], parallelism: usize) -> Result<f64> {
        if samples.is_empty() {
            return Err(LegatoError::insufficient_data(
                "no validation samples",
                "provide at least one tagged word sample",
            ));
        }
        if self.classifiers.is_empty() {
            return Err(LegatoError::insufficient_data(
                "the bank has no classifiers to validate",
                "train the bank with a lower dropout",
            ));
        }
        let pool = thread_pool(parallelism)?;
        let accumulator = Mutex::new((0.0f64, 0usize));
        pool.install(|| {
            self.classifiers.par_iter().for_each(|classifier| {
                let class = &classifier.feature.class;
                let positive_words: HashSet<&SyllabicWord> = samples
                    .iter()
                    .filter(|s| Arc::ptr_eq(&s.class, class) || s.class == *class)
                    .map(|s| &s.word)
                    .collect();
                let mut tp = 0usize;
                let mut fn_ = 0usize;
                let mut tn = 0usize;
                let mut fp = 0usize;
                for sample in samples {
                    let is_positive = Arc::ptr_eq(&sample.class, class) || sample.class == *class;
                    if !is_positive && positive_words.contains(&sample.word) {
                        continue;
                    }
                    let predicted = classifier.score(&sample.word) > 0.0;
                    match (is_positive, predicted) {
                        (true, true) => tp += 1,
                        (true, false) => fn_ += 1,
                        (false, false) => tn += 1,
                        (false, true) => fp += 1,
                    }
                }
                if let Some(fitness) = balanced_accuracy(tp, fp, tn, fn_) {
                    let mut acc = accumulator.lock().unwrap();
                    acc.0 += fitness;
                    acc.1 += 1;
                }
            });
        });
        let (sum, count) = accumulator.into_inner().unwrap();
        if count == 0 {
            return Err(LegatoError::insufficient_data(
                "no classifier had an evaluable validation sample",
                "provide samples covering the trained classes",
            ));
        }
        Ok(sum / count as f64)
    }
}

/// 並列度から有界のワーカースレッドプールを構築します。
///
/// 並列度0はrayonの既定(全コア)を意味します。
pub(crate) fn thread_pool(parallelism: usize) -> Result<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(parallelism)
        .build()
        .map_err(|e| LegatoError::invalid_state("failed to build a worker thread pool", e.to_string()))
}

fn validate_word_training_args(dropout: f64, decimation: usize) -> Result<()> {
    if !dropout.is_finite() || !(0.0..1.0).contains(&dropout) {
        return Err(LegatoError::invalid_argument(
            "dropout",
            "the dropout fraction must lie in [0, 1)",
        ));
    }
    if decimation == 0 {
        return Err(LegatoError::invalid_argument(
            "decimation",
            "the decimation interval must be positive",
        ));
    }
    Ok(())
}

fn dedup_samples(samples: &[TrainingSample]) -> Vec<TrainingSample> {
    let mut seen = HashSet::new();
    let mut unique = Vec::with_capacity(samples.len());
    for sample in samples {
        if seen.insert(sample.clone()) {
            unique.push(sample.clone());
        }
    }
    unique
}

// Positives plus every decimation-th negative, skipping negatives whose word
// also occurs positively for the class (homograph label noise).
fn class_training_set(
    positives: &[TrainingSample],
    class: &ClassRef,
    samples: &[TrainingSample],
    decimation: usize,
) -> (Vec<SyllabicWord>, Vec<SyllabicWord>) {
    let positive_words: HashSet<&SyllabicWord> = positives.iter().map(|s| &s.word).collect();
    let pos: Vec<SyllabicWord> = positives.iter().map(|s| s.word.clone()).collect();
    let neg: Vec<SyllabicWord> = samples
        .iter()
        .filter(|s| !Arc::ptr_eq(&s.class, class))
        .enumerate()
        .filter(|(i, s)| i % decimation == 0 && !positive_words.contains(&s.word))
        .map(|(_, s)| s.word.clone())
        .collect();
    (pos, neg)
}

fn balanced_accuracy(tp: usize, fp: usize, tn: usize, fn_: usize) -> Option<f64> {
    let pos = tp + fn_;
    let neg = tn + fp;
    if pos == 0 && neg == 0 {
        return None;
    }
    if pos == 0 {
        return Some(tn as f64 / neg as f64);
    }
    if neg == 0 {
        return Some(tp as f64 / pos as f64);
    }
    Some((tp as f64 / pos as f64 + tn as f64 / neg as f64) / 2.0)
}

// Per-class K-fold cross-validation over the option grid. Returns the first
// grid entry achieving the strictly highest mean fitness.
fn select_best_options<'a>(
    class: &ClassRef,
    positives: &[TrainingSample],
    samples: &[TrainingSample],
    options_grid: &'a [SvmOptions],
    fold_count: usize,
) -> Result<&'a SvmOptions> {
    let positive_words: HashSet<&SyllabicWord> = positives.iter().map(|s| &s.word).collect();
    let eligible = |sample: &TrainingSample| {
        Arc::ptr_eq(&sample.class, class) || !positive_words.contains(&sample.word)
    };

    let mut best: Option<(usize, f64)> = None;
    for (candidate, options) in options_grid.iter().enumerate() {
        let mut fitness_sum = 0.0;
        let mut usable_folds = 0usize;
        for fold in 0..fold_count {
            let mut train_pos = vec![];
            let mut train_neg = vec![];
            let mut eval = vec![];
            for (index, sample) in samples.iter().enumerate() {
                if !eligible(sample) {
                    continue;
                }
                let is_positive = Arc::ptr_eq(&sample.class, class);
                if index % fold_count == fold {
                    eval.push((sample, is_positive));
                } else if is_positive {
                    train_pos.push(sample.word.clone());
                } else {
                    train_neg.push(sample.word.clone());
                }
            }
            if eval.is_empty() {
                continue;
            }
            let svm = KernelSvm::train(&train_pos, &train_neg, options);
            let mut tp = 0usize;
            let mut fn_ = 0usize;
            let mut tn = 0usize;
            let mut fp = 0usize;
            for (sample, is_positive) in eval {
                let predicted = svm.score(&sample.word) > 0.0;
                match (is_positive, predicted) {
                    (true, true) => tp += 1,
                    (true, false) => fn_ += 1,
                    (false, false) => tn += 1,
                    (false, true) => fp += 1,
                }
            }
            if let Some(fitness) = balanced_accuracy(tp, fp, tn, fn_) {
                fitness_sum += fitness;
                usable_folds += 1;
            }
        }
        if usable_folds == 0 {
            return Err(LegatoError::insufficient_data(
                "a class had no usable cross-validation fold",
                "reorder the samples or change the fold count",
            ));
        }
        let mean = fitness_sum / usable_folds as f64;
        match best {
            // Ties keep the earliest candidate.
            Some((_, best_mean)) if mean <= best_mean => {}
            _ => best = Some((candidate, mean)),
        }
    }
    Ok(&options_grid[best.expect("non-empty option grid").0])
}
