//! 系列モデル向けの素性関数の構築
//!
//! このモジュールは、系列最適化エンジンが消費する固定配置の疎な素性
//! ベクトルを構築します。[`FeatureLayout`]が重みベクトルのインデックス
//! 空間の分割を定義し、[`FeatureFunctionFactory`]が入力語列ごとに
//! [`SentenceProvider`]を構築します。
//!
//! ファクトリは2つの有界MRUキャッシュを持ちます。語テキストをキーと
//! するスコアバンクのキャッシュ(既定容量1024)と、入力列オブジェクトの
//! 同一性をキーとするプロバイダのキャッシュ(既定容量128)です。後者は
//! 学習スコープの外でのみ使用されます。学習スコープでは素性ID採番の
//! 状態がパスの間に変わり得るため常に新しいプロバイダが必要であり、
//! また文内の語ごとのスコアバンク構築を並列に行うことがあります。

pub(crate) mod cache;

use std::sync::{Arc, Mutex};

use hashbrown::{HashMap, HashSet};
use rayon::prelude::*;

use crate::analogy::WordFormsDictionary;
use crate::classifier::WordClassifierBank;
use crate::crf::FeatureFunction;
use crate::errors::{LegatoError, Result};
use crate::features::cache::MruCache;
use crate::lang::Syllabizer;
use crate::score::{AnalogyOptions, ScoreBank, ScorePolicy};
use crate::tag::{Tag, TagSet};
use crate::word::SyllabicWord;

/// スコアバンクキャッシュの既定容量
const SCORE_BANK_CACHE_CAPACITY: usize = 1024;

/// プロバイダキャッシュの既定容量
const PROVIDER_CACHE_CAPACITY: usize = 128;

/// 素性関数の固定インデックス配置
///
/// `F` を分類器バンクの素性ID総数、`B` をバイグラム表の大きさとして、
/// 重みベクトルのインデックス空間を unigram指示 / 終端指示 / bigram指示 /
/// unigramバイアス / 終端バイアス / bigramバイアス / 大域バイアス の
/// ブロックに分割します。この分割はバンクの素性ID総数またはバイグラム表が
/// 変わるたびに再計算され、学習済み重みベクトルの長さと一致し続ける必要が
/// あります。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FeatureLayout {
    f: usize,
    b: usize,
}

impl FeatureLayout {
    /// 配置を計算します。
    ///
    /// # 引数
    ///
    /// * `feature_ids_count` - 分類器バンクの素性ID総数
    /// * `bigram_count` - バイグラム表の大きさ
    pub fn new(feature_ids_count: usize, bigram_count: usize) -> Self {
        Self {
            f: feature_ids_count,
            b: bigram_count,
        }
    }

    /// unigram指示ブロックの先頭
    pub fn unigram_indicators_offset(&self) -> usize {
        0
    }

    /// 終端指示スロット
    pub fn end_indicator_offset(&self) -> usize {
        self.f
    }

    /// bigram指示ブロックの先頭
    pub fn bigram_indicators_offset(&self) -> usize {
        self.f + 1
    }

    /// バイアスブロックの先頭
    pub fn biases_offset(&self) -> usize {
        self.f + 1 + self.b
    }

    /// unigramバイアスブロックの先頭
    pub fn unigram_biases_offset(&self) -> usize {
        self.biases_offset() + self.unigram_indicators_offset()
    }

    /// bigramバイアスブロックの先頭
    pub fn bigram_biases_offset(&self) -> usize {
        self.biases_offset() + self.bigram_indicators_offset()
    }

    /// 終端バイアススロット
    ///
    /// 歴代の配置 `end_indicator_offset + end_indicator_offset`(= 2F)を
    /// そのまま踏襲します。他のバイアススロットの規則に従えば
    /// `biases_offset + end_indicator_offset` になるはずですが、学習済み
    /// 重みベクトルはこの配置を前提に組まれているため、変更すると既存の
    /// 重みとの対応が壊れます。F > B+1 のとき、このスロットはunigram
    /// バイアスブロック内のスロットと一致し得ます。
    pub fn end_bias_offset(&self) -> usize {
        self.end_indicator_offset() + self.end_indicator_offset()
    }

    /// 大域バイアススロット(末尾)
    pub fn global_bias_offset(&self) -> usize {
        2 * (self.f + self.b + 1)
    }

    /// 素性関数の総数(重みベクトルの長さ)
    pub fn feature_functions_count(&self) -> usize {
        2 * (self.f + self.b + 1) + 1
    }

    /// 正規化係数 `10 / feature_functions_count`
    ///
    /// `weight · featureVector` の大きさを抑え、後段の指数計算を数値的に
    /// 安定させるための係数です。
    pub fn normalizer(&self) -> f64 {
        10.0 / self.feature_functions_count() as f64
    }
}

/// 許可されたタグバイグラムの表
///
/// 各遷移対をbigram素性インデックスに対応付けます。
#[derive(Debug, Default)]
pub struct BigramTable {
    pairs: HashMap<(Tag, Tag), usize>,
    ordered: Vec<(Tag, Tag)>,
}

impl BigramTable {
    /// 遷移対の列から表を構築します。インデックスは列挙順に割り当てられ、
    /// 重複は無視されます。
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (Tag, Tag)>,
    {
        let mut table = Self::default();
        for pair in pairs {
            if !table.pairs.contains_key(&pair) {
                table.pairs.insert(pair, table.ordered.len());
                table.ordered.push(pair);
            }
        }
        table
    }

    /// 遷移対が許可されている場合に `true` を返します。
    pub fn contains(&self, prev: Tag, tag: Tag) -> bool {
        self.pairs.contains_key(&(prev, tag))
    }

    /// 遷移対のbigram素性インデックスを返します。
    pub fn index(&self, prev: Tag, tag: Tag) -> Option<usize> {
        self.pairs.get(&(prev, tag)).copied()
    }

    /// 遷移対の数を返します。
    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    /// 遷移対を1つも持たない場合に `true` を返します。
    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    /// 遷移対をインデックス順に列挙します。
    pub fn pairs(&self) -> &[(Tag, Tag)] {
        &self.ordered
    }
}

/// 素性関数ファクトリ
///
/// 学習済みの分類器バンク、バイグラム表、スコア取得ポリシー、および
/// オプションの類推設定から素性配置を計算し、入力語列ごとにプロバイダを
/// 構築します。
pub struct FeatureFunctionFactory {
    bank: Arc<WordClassifierBank>,
    forms: Option<Arc<WordFormsDictionary>>,
    syllabizer: Arc<dyn Syllabizer>,
    bigrams: Arc<BigramTable>,
    policy: ScorePolicy,
    analogy: Option<AnalogyOptions>,
    layout: FeatureLayout,
    labels: Vec<u32>,
    bank_cache: Mutex<MruCache<String, Arc<ScoreBank>>>,
    provider_cache: Mutex<MruCache<usize, Arc<SentenceProvider>>>,
}

impl FeatureFunctionFactory {
    /// ファクトリを作成します。
    ///
    /// # エラー
    ///
    /// 類推オプションが指定されているのに語形辞書が存在しない場合、
    /// 状態エラーが返されます。
    pub fn new(
        bank: Arc<WordClassifierBank>,
        forms: Option<Arc<WordFormsDictionary>>,
        syllabizer: Arc<dyn Syllabizer>,
        bigrams: Arc<BigramTable>,
        policy: ScorePolicy,
        analogy: Option<AnalogyOptions>,
    ) -> Result<Self> {
        if analogy.is_some() && forms.is_none() {
            return Err(LegatoError::invalid_state(
                "analogy scoring requested",
                "the word-forms dictionary has not been built",
            ));
        }
        let layout = FeatureLayout::new(bank.feature_ids_count(), bigrams.len());
        let labels = bank
            .tag_set()
            .regular_tags()
            .map(|t| u32::from(t.id()))
            .collect();
        Ok(Self {
            bank,
            forms,
            syllabizer,
            bigrams,
            policy,
            analogy,
            layout,
            labels,
            bank_cache: Mutex::new(MruCache::new(SCORE_BANK_CACHE_CAPACITY)),
            provider_cache: Mutex::new(MruCache::new(PROVIDER_CACHE_CAPACITY)),
        })
    }

    /// 素性配置を返します。
    pub fn layout(&self) -> &FeatureLayout {
        &self.layout
    }

    /// バイグラム表を返します。
    pub fn bigrams(&self) -> &Arc<BigramTable> {
        &self.bigrams
    }

    /// 分類器バンクを返します。
    pub fn bank(&self) -> &Arc<WordClassifierBank> {
        &self.bank
    }

    /// スコア取得ポリシーを返します。
    pub fn policy(&self) -> ScorePolicy {
        self.policy
    }

    /// 音節化器を返します。
    pub fn syllabizer(&self) -> &Arc<dyn Syllabizer> {
        &self.syllabizer
    }

    /// 語形類推辞書を返します。
    pub fn forms(&self) -> Option<&Arc<WordFormsDictionary>> {
        self.forms.as_ref()
    }

    /// 類推強化のオプションを返します。
    pub fn analogy(&self) -> Option<&AnalogyOptions> {
        self.analogy.as_ref()
    }

    /// 語形のスコアバンクをキャッシュ経由で取得します。
    ///
    /// ミス時の構築はロックの外で行われるため、同一キーの並行ミスでは
    /// 構築が複数回走ることがあります。
    pub fn score_bank(&self, word: &SyllabicWord) -> Arc<ScoreBank> {
        let key = word.text();
        if let Some(hit) = self.bank_cache.lock().unwrap().get(key.as_str()) {
            return hit;
        }
        let bank = Arc::new(self.compute_score_bank(word));
        self.bank_cache
            .lock()
            .unwrap()
            .insert(key, Arc::clone(&bank));
        bank
    }

    fn compute_score_bank(&self, word: &SyllabicWord) -> ScoreBank {
        let dictionary = self.policy.dictionary_option();
        match (&self.analogy, &self.forms) {
            (Some(options), Some(forms)) => self.bank.analogy_score_bank(
                word,
                forms,
                self.syllabizer.as_ref(),
                options,
                dictionary,
            ),
            _ => self.bank.score_bank(word, None, dictionary),
        }
    }

    /// 入力列のプロバイダをキャッシュ経由で取得します。
    ///
    /// キャッシュのキーは入力列オブジェクトの同一性です。学習スコープでは
    /// 使用せず、[`FeatureFunctionFactory::training_provider`]を使用して
    /// ください。
    pub fn provider(&self, words: &Arc<[SyllabicWord]>) -> Arc<SentenceProvider> {
        let key = Arc::as_ptr(words) as *const SyllabicWord as usize;
        if let Some(hit) = self.provider_cache.lock().unwrap().get(&key) {
            return hit;
        }
        let provider = Arc::new(self.build_provider(words, false));
        self.provider_cache
            .lock()
            .unwrap()
            .insert(key, Arc::clone(&provider));
        provider
    }

    /// 学習スコープ用の新しいプロバイダを構築します。
    ///
    /// プロバイダキャッシュを使わず、語ごとのスコアバンク構築を文内で
    /// 並列に行います。
    pub fn training_provider(&self, words: &[SyllabicWord]) -> SentenceProvider {
        self.build_provider(words, true)
    }

    fn build_provider(&self, words: &[SyllabicWord], parallel: bool) -> SentenceProvider {
        let banks: Vec<Arc<ScoreBank>> = if parallel {
            words.par_iter().map(|w| self.score_bank(w)).collect()
        } else {
            words.iter().map(|w| self.score_bank(w)).collect()
        };
        // The non-merging variant is only valid when condensed ids guarantee
        // per-position uniqueness.
        let merge = !self.bank.dictionary_features_condensed();
        let tag_set = Arc::clone(self.bank.tag_set());
        let positions = banks
            .into_iter()
            .map(|bank| {
                PositionScores::build(bank, &self.layout, self.policy, tag_set.as_ref(), merge)
            })
            .collect();
        SentenceProvider {
            layout: self.layout,
            bigrams: Arc::clone(&self.bigrams),
            tag_set,
            policy: self.policy,
            labels: self.labels.clone(),
            positions,
        }
    }
}

/// 1位置分の前計算済みスコア
struct PositionScores {
    bank: Arc<ScoreBank>,
    vectors: HashMap<u32, Vec<(u32, f64)>>,
    matched: HashSet<u32>,
}

impl PositionScores {
    fn build(
        bank: Arc<ScoreBank>,
        layout: &FeatureLayout,
        policy: ScorePolicy,
        tag_set: &TagSet,
        merge: bool,
    ) -> Self {
        let normalizer = layout.normalizer();
        let mut vectors = HashMap::new();
        let mut matched = HashSet::new();
        for tag in bank.tags() {
            let mut entries: Vec<(u32, f64)> = vec![];
            let mut any = false;
            for score in bank.scores(tag, policy, tag_set) {
                any = true;
                if score.value() >= 1.0 {
                    matched.insert(u32::from(tag.id()));
                }
                let id = score.feature().id();
                push_entry(
                    &mut entries,
                    (layout.unigram_indicators_offset() + id) as u32,
                    score.value() * normalizer,
                    merge,
                );
                push_entry(
                    &mut entries,
                    (layout.unigram_biases_offset() + id) as u32,
                    normalizer,
                    merge,
                );
            }
            if any {
                entries.sort_unstable_by_key(|&(index, _)| index);
                entries.push((layout.global_bias_offset() as u32, normalizer));
                vectors.insert(u32::from(tag.id()), entries);
            }
        }
        Self {
            bank,
            vectors,
            matched,
        }
    }
}

fn push_entry(entries: &mut Vec<(u32, f64)>, index: u32, value: f64, merge: bool) {
    if merge {
        if let Some(slot) = entries.iter_mut().find(|(i, _)| *i == index) {
            slot.1 += value;
            return;
        }
    }
    entries.push((index, value));
}

/// 文ごとの素性関数プロバイダ
///
/// 各位置の語のスコアバンクを前計算し、系列最適化エンジンの素性関数
/// 契約を実装します。
pub struct SentenceProvider {
    layout: FeatureLayout,
    bigrams: Arc<BigramTable>,
    tag_set: Arc<TagSet>,
    policy: ScorePolicy,
    labels: Vec<u32>,
    positions: Vec<PositionScores>,
}

impl SentenceProvider {
    /// 位置のスコアバンクを返します。
    pub fn score_bank_at(&self, pos: usize) -> &Arc<ScoreBank> {
        &self.positions[pos].bank
    }

    /// スコア取得ポリシーを返します。
    pub fn policy(&self) -> ScorePolicy {
        self.policy
    }

    /// タグ集合を返します。
    pub fn tag_set(&self) -> &Arc<TagSet> {
        &self.tag_set
    }

    fn matched(&self, pos: usize, label: u32) -> bool {
        self.positions[pos].matched.contains(&label)
    }
}

impl FeatureFunction for SentenceProvider {
    fn num_weights(&self) -> usize {
        self.layout.feature_functions_count()
    }

    fn len(&self) -> usize {
        self.positions.len()
    }

    fn labels(&self) -> &[u32] {
        &self.labels
    }

    fn start_label(&self) -> u32 {
        u32::from(self.tag_set.bos().id())
    }

    fn end_label(&self) -> u32 {
        u32::from(self.tag_set.eos().id())
    }

    fn unigram(&self, pos: usize, label: u32, out: &mut Vec<(u32, f64)>) {
        let normalizer = self.layout.normalizer();
        if pos == self.positions.len() {
            // The end of the sequence emits exactly three entries.
            out.push((self.layout.end_indicator_offset() as u32, normalizer));
            out.push((self.layout.end_bias_offset() as u32, normalizer));
            out.push((self.layout.global_bias_offset() as u32, normalizer));
            return;
        }
        match self.positions[pos].vectors.get(&label) {
            Some(entries) => out.extend_from_slice(entries),
            None => out.push((self.layout.global_bias_offset() as u32, normalizer)),
        }
    }

    fn bigram(&self, pos: usize, prev: u32, label: u32, out: &mut Vec<(u32, f64)>) {
        let prev_tag = Tag(prev as u16);
        let tag = Tag(label as u16);
        let index = match self.bigrams.index(prev_tag, tag) {
            Some(index) => index,
            None => return,
        };
        let normalizer = self.layout.normalizer();
        let matched_first = pos == 0 || self.matched(pos - 1, prev);
        let matched_second = pos == self.positions.len() || self.matched(pos, label);
        if matched_first && matched_second {
            out.push((
                (self.layout.bigram_indicators_offset() + index) as u32,
                normalizer,
            ));
        } else if !matched_first && !matched_second {
            out.push((
                (self.layout.bigram_indicators_offset() + index) as u32,
                -normalizer,
            ));
        }
        out.push((
            (self.layout.bigram_biases_offset() + index) as u32,
            normalizer,
        ));
    }

    fn transition_allowed(&self, prev: u32, label: u32) -> bool {
        self.bigrams.contains(Tag(prev as u16), Tag(label as u16))
    }
}
