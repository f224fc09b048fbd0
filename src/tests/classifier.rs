use std::sync::Arc;

use hashbrown::HashSet;

use crate::analogy::{normalized_edit_distance, WordFormsDictionary};
use crate::classifier::{partition, TrainingSample, WordClassifierBank};
use crate::errors::LegatoError;
use crate::score::{AnalogyOptions, DictionaryOption, Falloff, ScorePolicy};
use crate::svm::{KernelSvm, SvmOptions};
use crate::test_utils::{test_lang, TestLang};
use crate::word::SyllabicWord;

// 12 samples of one frequent NOUN class (trailing-s deletion on 4-syllable
// words), 1 VERB identity sample, 7 PUNCT identity samples.
fn scenario_samples(lang: &TestLang) -> Vec<TrainingSample> {
    let mut samples = vec![];
    for i in 0..12 {
        let surface = format!("w{}{}s", i / 10, i % 10);
        let lemma = &surface[..surface.len() - 1];
        samples.push(lang.sample(&surface, lemma, lang.noun));
    }
    samples.push(lang.sample("go", "go", lang.verb));
    for i in 0..7 {
        let surface = format!("p{i}");
        samples.push(lang.sample(&surface, &surface, lang.punct));
    }
    samples
}

/// 分割が互いに素で全クラスを尽くすことのテスト
#[test]
fn test_partition_disjoint_exhaustive() {
    let lang = test_lang();
    let samples = scenario_samples(&lang);
    let parts = partition(&samples, 0.1, &lang.tag_set);

    let common: HashSet<_> = parts.common.iter().map(|g| g.class.clone()).collect();
    let exceptional: HashSet<_> = parts.exceptional.iter().map(|g| g.class.clone()).collect();
    assert!(common.is_disjoint(&exceptional));

    let all: HashSet<_> = samples.iter().map(|s| s.class().clone()).collect();
    let covered: HashSet<_> = common.union(&exceptional).cloned().collect();
    assert_eq!(all, covered);
}

/// 頻度0.6のクラスが分類器になり、頻度0.05のクラスが辞書に落ちることの
/// テスト
#[test]
fn test_dropout_scenario() {
    let lang = test_lang();
    let samples = scenario_samples(&lang);
    let bank = WordClassifierBank::train(
        Arc::clone(&lang.tag_set),
        &samples,
        &SvmOptions::default(),
        0.1,
        1,
        1,
    )
    .unwrap();

    // Only the frequent NOUN class gets a classifier. The VERB class at
    // frequency 0.05 and the unrelated PUNCT class fall into the dictionary.
    assert_eq!(bank.classifiers().len(), 1);
    let class = bank.classifiers()[0].feature().class().clone();
    assert_eq!(class.tag(), lang.noun);
    assert_eq!(bank.classifiers()[0].feature().id(), 0);
    assert_eq!(bank.dictionary_class_count(), 2);
    assert_eq!(bank.feature_ids_count(), 3);

    let score_bank = bank.score_bank(&lang.word("go"), None, DictionaryOption::Full);
    let dict = score_bank.dictionary_scores(lang.verb);
    assert_eq!(dict.len(), 1);
    assert_eq!(dict[0].value(), 10.0);
}

/// 明確に分離可能なデータでSVMが訓練点を正しく判別することのテスト
#[test]
fn test_svm_separable() {
    let lang = test_lang();
    let positives: Vec<SyllabicWord> =
        ["aas", "abs", "acs"].iter().map(|w| lang.word(w)).collect();
    let negatives: Vec<SyllabicWord> =
        ["zzz", "yyy", "xxx"].iter().map(|w| lang.word(w)).collect();
    let svm = KernelSvm::train(&positives, &negatives, &SvmOptions::default());
    for w in &positives {
        assert!(svm.score(w) > 0.0, "{w:?}");
    }
    for w in &negatives {
        assert!(svm.score(w) < 0.0, "{w:?}");
    }
}

/// 採番モードの往復が元の展開IDを正確に復元することのテスト
#[test]
fn test_condense_expand_round_trip() {
    let lang = test_lang();
    // Three exceptional classes, two of them sharing the NOUN tag.
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
    assert_eq!(bank.classifiers().len(), 0);
    assert_eq!(bank.feature_ids_count(), 3);
    assert!(!bank.dictionary_features_condensed());

    let expanded_id = |bank: &WordClassifierBank, surface: &str, tag| {
        let sb = bank.score_bank(&lang.word(surface), None, DictionaryOption::Full);
        sb.dictionary_scores(tag)[0].feature().id()
    };
    let cats_id = expanded_id(&bank, "cats", lang.noun);
    let feet_id = expanded_id(&bank, "feet", lang.noun);
    let ran_id = expanded_id(&bank, "ran", lang.verb);
    let mut ids = [cats_id, feet_id, ran_id];
    ids.sort_unstable();
    assert_eq!(ids, [0, 1, 2]);

    let condensed = bank.with_dictionary_condensed(true).unwrap();
    assert!(condensed.dictionary_features_condensed());
    // The two NOUN classes share one id.
    assert_eq!(condensed.feature_ids_count(), 2);
    assert_eq!(
        expanded_id(&condensed, "cats", lang.noun),
        expanded_id(&condensed, "feet", lang.noun)
    );

    let restored = condensed.with_dictionary_condensed(false).unwrap();
    assert_eq!(restored.feature_ids_count(), 3);
    assert_eq!(expanded_id(&restored, "cats", lang.noun), cats_id);
    assert_eq!(expanded_id(&restored, "feet", lang.noun), feet_id);
    assert_eq!(expanded_id(&restored, "ran", lang.verb), ran_id);
}

/// 交差検証が同点のとき先のグリッド要素を選ぶことのテスト
#[test]
fn test_optimal_train_tie_break() {
    let lang = test_lang();
    let mut samples = vec![];
    for surface in ["aas", "abs", "acs", "ads"] {
        samples.push(lang.sample(surface, &surface[..2], lang.noun));
    }
    for surface in ["zzz", "yyy", "xxx", "www"] {
        samples.push(lang.sample(surface, surface, lang.verb));
    }
    let grid = vec![
        SvmOptions {
            exponent: 2,
            ..SvmOptions::default()
        },
        SvmOptions {
            exponent: 3,
            ..SvmOptions::default()
        },
    ];
    let bank = WordClassifierBank::optimal_train(
        Arc::clone(&lang.tag_set),
        &samples,
        &grid,
        2,
        0.2,
        1,
        1,
    )
    .unwrap();
    // Both candidates separate the folds perfectly, so the earliest wins.
    for classifier in bank.classifiers() {
        assert_eq!(classifier.svm_options(), &grid[0]);
    }
    assert!(!bank.classifiers().is_empty());
}

/// 空のオプショングリッドが設定エラーになることのテスト
#[test]
fn test_optimal_train_empty_grid() {
    let lang = test_lang();
    let samples = vec![lang.sample("cats", "cat", lang.noun)];
    let result = WordClassifierBank::optimal_train(
        Arc::clone(&lang.tag_set),
        &samples,
        &[],
        2,
        0.1,
        1,
        1,
    );
    assert!(matches!(result, Err(LegatoError::InvalidArgument(_))));
}

/// 事前条件の検証が作業開始前に行われることのテスト
#[test]
fn test_precondition_validation() {
    let lang = test_lang();
    let samples = vec![lang.sample("cats", "cat", lang.noun)];
    let options = SvmOptions::default();
    let bad_dropout = WordClassifierBank::train(
        Arc::clone(&lang.tag_set),
        &samples,
        &options,
        1.5,
        1,
        1,
    );
    assert!(matches!(bad_dropout, Err(LegatoError::InvalidArgument(_))));
    let bad_decimation = WordClassifierBank::train(
        Arc::clone(&lang.tag_set),
        &samples,
        &options,
        0.1,
        0,
        1,
    );
    assert!(matches!(
        bad_decimation,
        Err(LegatoError::InvalidArgument(_))
    ));
}

/// 検証が分離可能なデータで満点になることのテスト
#[test]
fn test_validate() {
    let lang = test_lang();
    let mut samples = vec![];
    for surface in ["aas", "abs", "acs", "ads"] {
        samples.push(lang.sample(surface, &surface[..2], lang.noun));
    }
    for surface in ["zzz", "yyy", "xxx", "www"] {
        samples.push(lang.sample(surface, surface, lang.verb));
    }
    let bank = WordClassifierBank::train(
        Arc::clone(&lang.tag_set),
        &samples,
        &SvmOptions::default(),
        0.2,
        1,
        1,
    )
    .unwrap();
    let fitness = bank.validate(&samples, 1).unwrap();
    assert!(fitness > 0.9, "{fitness}");
}

/// 空の検証集合がデータ不足エラーになることのテスト
#[test]
fn test_validate_empty() {
    let lang = test_lang();
    let samples = vec![lang.sample("aas", "aa", lang.noun)];
    let bank = WordClassifierBank::train(
        Arc::clone(&lang.tag_set),
        &samples,
        &SvmOptions::default(),
        0.9,
        1,
        1,
    )
    .unwrap();
    assert!(matches!(
        bank.validate(&[], 1),
        Err(LegatoError::InsufficientData(_))
    ));
}

/// 類推強化がスコアを減らさず、非関連種別を強化しないことのテスト
#[test]
fn test_analogy_reinforcement() {
    let lang = test_lang();
    let samples = vec![
        lang.sample("abcdes", "abcde", lang.noun),
        lang.sample("abcde", "abcde", lang.noun),
        lang.sample("abcdes", "abcdes", lang.punct),
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

    let distance = |a: &SyllabicWord, b: &SyllabicWord| {
        normalized_edit_distance(a, b, &lang.syllabizer)
    };
    let forms = WordFormsDictionary::bulk(
        vec![lang.word("abcdes"), lang.word("abcde")],
        &distance,
    );
    let options = AnalogyOptions {
        max_normalized_distance: 0.5,
        falloff: Falloff::Reciprocal { lambda: 1.0 },
    };

    let base = bank.score_bank(&lang.word("abcdes"), None, DictionaryOption::Full);
    let reinforced = bank.analogy_score_bank(
        &lang.word("abcdes"),
        &forms,
        &lang.syllabizer,
        &options,
        DictionaryOption::Full,
    );

    // The NOUN deletion class implies "abcde"; the neighbor "abcde" carries an
    // identity class implying the same lemma at distance 1/5.
    let d = 1.0 / 5.0;
    let expected = 10.0 + 10.0 / (1.0 + d);
    let noun = reinforced.dictionary_scores(lang.noun);
    assert_eq!(noun.len(), 1);
    assert!((noun[0].value() - expected).abs() < 1e-9, "{}", noun[0].value());
    assert!(noun[0].value() >= base.dictionary_scores(lang.noun)[0].value());

    // Scores of an unrelated tag type stay untouched.
    let punct = reinforced.dictionary_scores(lang.punct);
    assert_eq!(punct.len(), 1);
    assert_eq!(punct[0].value(), 10.0);
}

/// 検索半径が短い語で縮むことのテスト
#[test]
fn test_analogy_radius_shrinks() {
    let lang = test_lang();
    let samples = vec![
        lang.sample("cats", "cat", lang.noun),
        lang.sample("cat", "cat", lang.noun),
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
    let distance = |a: &SyllabicWord, b: &SyllabicWord| {
        normalized_edit_distance(a, b, &lang.syllabizer)
    };
    let forms =
        WordFormsDictionary::bulk(vec![lang.word("cats"), lang.word("cat")], &distance);
    let options = AnalogyOptions {
        max_normalized_distance: 0.5,
        falloff: Falloff::Reciprocal { lambda: 1.0 },
    };

    // radius = 0.5 - 1/3 < d("cats", "cat") = 1/3, so nothing is reinforced.
    let reinforced = bank.analogy_score_bank(
        &lang.word("cats"),
        &forms,
        &lang.syllabizer,
        &options,
        DictionaryOption::Full,
    );
    assert_eq!(reinforced.dictionary_scores(lang.noun)[0].value(), 10.0);
}

/// Proportionalポリシーが残余辞書で問い合わせることのテスト
#[test]
fn test_policy_dictionary_options() {
    assert_eq!(
        ScorePolicy::Proportional.dictionary_option(),
        DictionaryOption::Residual
    );
    assert_eq!(
        ScorePolicy::Mixed.dictionary_option(),
        DictionaryOption::Full
    );
    assert_eq!(
        ScorePolicy::Prioritized.dictionary_option(),
        DictionaryOption::Full
    );
}
