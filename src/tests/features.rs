use std::sync::Arc;

use crate::classifier::WordClassifierBank;
use crate::crf::FeatureFunction;
use crate::features::cache::MruCache;
use crate::features::{BigramTable, FeatureFunctionFactory, FeatureLayout};
use crate::score::ScorePolicy;
use crate::svm::SvmOptions;
use crate::test_utils::{test_lang, TestLang};
use crate::word::SyllabicWord;

/// 素性配置の各オフセットの定義のテスト
#[test]
fn test_layout_offsets() {
    let layout = FeatureLayout::new(5, 3);
    assert_eq!(layout.unigram_indicators_offset(), 0);
    assert_eq!(layout.end_indicator_offset(), 5);
    assert_eq!(layout.bigram_indicators_offset(), 6);
    assert_eq!(layout.biases_offset(), 9);
    assert_eq!(layout.unigram_biases_offset(), 9);
    assert_eq!(layout.bigram_biases_offset(), 15);
    // The historical layout puts the end bias at 2F, not at
    // biases_offset + end_indicator_offset.
    assert_eq!(layout.end_bias_offset(), 10);
    assert_eq!(layout.global_bias_offset(), 18);
    assert_eq!(layout.feature_functions_count(), 19);
    assert!((layout.normalizer() - 10.0 / 19.0).abs() < 1e-12);
}

/// `feature_functions_count`の公式が採番モード切り替え後も成り立つことの
/// テスト
#[test]
fn test_layout_count_after_toggle() {
    let lang = test_lang();
    let samples = vec![
        lang.sample("cats", "cat", lang.noun),
        lang.sample("feet", "foot", lang.noun),
        lang.sample("ran", "run", lang.verb),
    ];
    let bank = WordClassifierBank::train(
        Arc::clone(&lang.tag_set),
        &samples,
        &SvmOptions::default(),
        0.9,
        1,
        1,
    )
    .unwrap();
    let bigrams = BigramTable::from_pairs(vec![(lang.tag_set.bos(), lang.noun)]);

    for condensed in [false, true, false] {
        let bank = bank.with_dictionary_condensed(condensed).unwrap();
        let layout = FeatureLayout::new(bank.feature_ids_count(), bigrams.len());
        assert_eq!(
            layout.feature_functions_count(),
            2 * (bank.feature_ids_count() + bigrams.len() + 1) + 1
        );
    }
}

/// バイグラム表の重複除去とインデックス割り当てのテスト
#[test]
fn test_bigram_table() {
    let lang = test_lang();
    let bos = lang.tag_set.bos();
    let eos = lang.tag_set.eos();
    let table = BigramTable::from_pairs(vec![
        (bos, lang.noun),
        (lang.noun, eos),
        (bos, lang.noun),
        (lang.noun, lang.verb),
    ]);
    assert_eq!(table.len(), 3);
    assert_eq!(table.index(bos, lang.noun), Some(0));
    assert_eq!(table.index(lang.noun, eos), Some(1));
    assert_eq!(table.index(lang.noun, lang.verb), Some(2));
    assert!(!table.contains(lang.verb, lang.noun));
}

/// MRUキャッシュの容量上限と追い出し順序のテスト
#[test]
fn test_mru_cache() {
    let mut cache: MruCache<String, usize> = MruCache::new(2);
    cache.insert("a".to_string(), 1);
    cache.insert("b".to_string(), 2);
    assert_eq!(cache.get("a"), Some(1));
    cache.insert("c".to_string(), 3);
    assert_eq!(cache.len(), 2);
    // "b" was the least recently used entry.
    assert_eq!(cache.get("b"), None);
    assert_eq!(cache.get("a"), Some(1));
    assert_eq!(cache.get("c"), Some(3));
}

fn dictionary_factory(lang: &TestLang) -> FeatureFunctionFactory {
    // A dictionary-only bank: one NOUN deletion class for "abcdes".
    let samples = vec![lang.sample("abcdes", "abcde", lang.noun)];
    let bank = WordClassifierBank::train(
        Arc::clone(&lang.tag_set),
        &samples,
        &SvmOptions::default(),
        0.9,
        1,
        1,
    )
    .unwrap();
    let bigrams = BigramTable::from_pairs(vec![
        (lang.tag_set.bos(), lang.noun),
        (lang.noun, lang.tag_set.eos()),
    ]);
    FeatureFunctionFactory::new(
        Arc::new(bank),
        None,
        Arc::new(lang.syllabizer),
        Arc::new(bigrams),
        ScorePolicy::Mixed,
        None,
    )
    .unwrap()
}

/// プロバイダのunigram素性の放出規則のテスト
#[test]
fn test_provider_unigram_emission() {
    let lang = test_lang();
    let factory = dictionary_factory(&lang);
    let layout = *factory.layout();
    let normalizer = layout.normalizer();
    let words: Arc<[SyllabicWord]> = vec![lang.word("abcdes")].into();
    let provider = factory.provider(&words);

    // The dictionary hit emits its indicator, its bias, and the global bias.
    let mut out = vec![];
    provider.unigram(0, u32::from(lang.noun.id()), &mut out);
    assert_eq!(out.len(), 3);
    assert_eq!(out[0], (0u32, 10.0 * normalizer));
    assert_eq!(out[1], (layout.unigram_biases_offset() as u32, normalizer));
    assert_eq!(out[2], (layout.global_bias_offset() as u32, normalizer));

    // A tag without scores only emits the global bias.
    let mut out = vec![];
    provider.unigram(0, u32::from(lang.verb.id()), &mut out);
    assert_eq!(out, vec![(layout.global_bias_offset() as u32, normalizer)]);

    // The end of the sequence emits exactly three entries.
    let mut out = vec![];
    provider.unigram(1, provider.end_label(), &mut out);
    assert_eq!(
        out,
        vec![
            (layout.end_indicator_offset() as u32, normalizer),
            (layout.end_bias_offset() as u32, normalizer),
            (layout.global_bias_offset() as u32, normalizer),
        ]
    );
}

/// プロバイダのbigram素性の放出規則のテスト
#[test]
fn test_provider_bigram_emission() {
    let lang = test_lang();
    let factory = dictionary_factory(&lang);
    let layout = *factory.layout();
    let normalizer = layout.normalizer();
    let words: Arc<[SyllabicWord]> = vec![lang.word("abcdes")].into();
    let provider = factory.provider(&words);
    let noun = u32::from(lang.noun.id());
    let verb = u32::from(lang.verb.id());

    // (BOS, NOUN) is allowed; the start matches implicitly and the dictionary
    // hit at 10.0 matches the current position.
    let mut out = vec![];
    provider.bigram(0, provider.start_label(), noun, &mut out);
    assert_eq!(
        out,
        vec![
            (layout.bigram_indicators_offset() as u32, normalizer),
            (layout.bigram_biases_offset() as u32, normalizer),
        ]
    );

    // A pair outside the table emits nothing.
    let mut out = vec![];
    provider.bigram(0, provider.start_label(), verb, &mut out);
    assert!(out.is_empty());
    assert!(!provider.transition_allowed(provider.start_label(), verb));

    // (NOUN, EOS) at the end boundary: both sides match.
    let mut out = vec![];
    provider.bigram(1, noun, provider.end_label(), &mut out);
    assert_eq!(
        out,
        vec![
            ((layout.bigram_indicators_offset() + 1) as u32, normalizer),
            ((layout.bigram_biases_offset() + 1) as u32, normalizer),
        ]
    );
}

/// プロバイダキャッシュが入力列の同一性をキーとすることのテスト
#[test]
fn test_provider_identity_cache() {
    let lang = test_lang();
    let factory = dictionary_factory(&lang);
    let words: Arc<[SyllabicWord]> = vec![lang.word("abcdes")].into();
    let first = factory.provider(&words);
    let second = factory.provider(&words);
    assert!(Arc::ptr_eq(&first, &second));

    // An equal but distinct sentence object builds a fresh provider.
    let other: Arc<[SyllabicWord]> = vec![lang.word("abcdes")].into();
    let third = factory.provider(&other);
    assert!(!Arc::ptr_eq(&first, &third));

    // Training scope always builds a fresh provider.
    let _ = factory.training_provider(&words);
}
