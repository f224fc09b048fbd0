use std::sync::Arc;

use crate::classifier::WordClassifierBank;
use crate::crf::{
    offline_train, FeatureFunction, LinearChainCrf, OfflineOptions, OnlineOptions, SampleOrder,
};
use crate::errors::LegatoError;
use crate::features::{BigramTable, FeatureFunctionFactory};
use crate::lang::{CharSyllabizer, WhitespaceSentenceBreaker};
use crate::resource::LanguageResource;
use crate::score::ScorePolicy;
use crate::svm::SvmOptions;
use crate::tagger::SentenceClassifier;
use crate::test_utils::{test_lang, TestLang};
use crate::trainer::{mine_bigrams, Corpus, CrfTrainingOptions, Trainer, TrainerOptions};
use crate::word::SyllabicWord;

// A toy feature function over two positions and two labels with one
// indicator per (position, label) and per transition slot.
struct ToyFeatures {
    allowed: bool,
}

const TOY_LABELS: [u32; 2] = [10, 11];
const TOY_START: u32 = 8;
const TOY_END: u32 = 9;

impl FeatureFunction for ToyFeatures {
    fn num_weights(&self) -> usize {
        12
    }

    fn len(&self) -> usize {
        2
    }

    fn labels(&self) -> &[u32] {
        &TOY_LABELS
    }

    fn start_label(&self) -> u32 {
        TOY_START
    }

    fn end_label(&self) -> u32 {
        TOY_END
    }

    fn unigram(&self, pos: usize, label: u32, out: &mut Vec<(u32, f64)>) {
        if label == TOY_END {
            return;
        }
        out.push(((pos * 2 + (label - 10) as usize) as u32, 1.0));
    }

    fn bigram(&self, pos: usize, prev: u32, label: u32, out: &mut Vec<(u32, f64)>) {
        let slot = match (pos, prev, label) {
            (0, TOY_START, l) => 4 + (l - 10),
            (1, p, l) => 6 + (p - 10) * 2 + (l - 10),
            (2, p, TOY_END) => 10 + (p - 10),
            _ => return,
        };
        out.push((slot, 1.0));
    }

    fn transition_allowed(&self, _prev: u32, _label: u32) -> bool {
        self.allowed
    }
}

fn toy_path_score(weights: &[f64], y0: u32, y1: u32) -> f64 {
    weights[(y0 - 10) as usize]
        + weights[2 + (y1 - 10) as usize]
        + weights[(4 + (y0 - 10)) as usize]
        + weights[(6 + (y0 - 10) * 2 + (y1 - 10)) as usize]
        + weights[(10 + (y1 - 10)) as usize]
}

/// ビタビのスコアが全経路の列挙による最大値と一致することのテスト
#[test]
fn test_crf_viterbi_matches_enumeration() {
    let weights: Vec<f64> = vec![
        0.3, -0.2, 0.1, 0.5, 0.05, -0.1, 0.2, -0.3, 0.4, 0.0, -0.15, 0.25,
    ];
    let crf = LinearChainCrf::new(weights.clone());
    let ff = ToyFeatures { allowed: true };

    let mut best = f64::NEG_INFINITY;
    let mut best_path = (TOY_LABELS[0], TOY_LABELS[0]);
    let mut log_norm_terms = vec![];
    for &y0 in &TOY_LABELS {
        for &y1 in &TOY_LABELS {
            let score = toy_path_score(&weights, y0, y1);
            log_norm_terms.push(score);
            if score > best {
                best = score;
                best_path = (y0, y1);
            }
        }
    }

    let (path, score) = crf.decode(&ff).unwrap();
    assert_eq!(path, vec![best_path.0, best_path.1]);
    assert!((score - best).abs() < 1e-9);

    let expected_log_norm = crate::crf::log_sum_exp(log_norm_terms.into_iter());
    assert!((crf.log_norm(&ff) - expected_log_norm).abs() < 1e-9);
}

/// 遷移が全面的に禁止された系列のデコードが不可能を返すことのテスト
#[test]
fn test_crf_infeasible() {
    let crf = LinearChainCrf::new(vec![0.0; 12]);
    let ff = ToyFeatures { allowed: false };
    assert!(crf.decode(&ff).is_none());
}

/// オフライン学習が単純な系列を学習できることのテスト
#[test]
fn test_crf_offline_learns() {
    let data = vec![(ToyFeatures { allowed: true }, vec![10u32, 11u32])];
    let crf = offline_train(&data, 12, &OfflineOptions::default()).unwrap();
    let (path, _) = crf.decode(&data[0].0).unwrap();
    assert_eq!(path, vec![10, 11]);
}

fn forced_path_corpus() -> Corpus {
    Corpus::from_reader(
        "cats\tcat\tNOUN\nrun\trun\tVERB\nEOS\ndogs\tdog\tNOUN\nrun\trun\tVERB\nEOS\n".as_bytes(),
    )
    .unwrap()
}

fn trained_resource(lang: &TestLang, options: TrainerOptions) -> LanguageResource {
    let mut resource = LanguageResource::new(
        Arc::new(CharSyllabizer),
        Arc::new(WhitespaceSentenceBreaker),
        Arc::clone(&lang.tag_set),
    );
    Trainer::new(options)
        .train(&mut resource, &forced_path_corpus())
        .unwrap();
    resource
}

/// バイグラム採掘が境界タグを含み、初出順でインデックスを割り当てることの
/// テスト
#[test]
fn test_mine_bigrams() {
    let lang = test_lang();
    let sentences = vec![
        (
            vec![lang.word("cats"), lang.word("run")],
            vec![lang.noun, lang.verb],
        ),
        (
            vec![lang.word("dogs"), lang.word("run")],
            vec![lang.noun, lang.verb],
        ),
    ];
    let table = mine_bigrams(&sentences, &lang.tag_set, 0.0).unwrap();
    assert_eq!(table.len(), 3);
    assert_eq!(table.index(lang.tag_set.bos(), lang.noun), Some(0));
    assert_eq!(table.index(lang.noun, lang.verb), Some(1));
    assert_eq!(table.index(lang.verb, lang.tag_set.eos()), Some(2));

    // Every bigram holds a third of the occurrences, so a higher threshold
    // drops them all.
    let table = mine_bigrams(&sentences, &lang.tag_set, 0.34).unwrap();
    assert_eq!(table.len(), 0);
}

/// 制約が1本の経路だけを許す文のデコードのテスト
#[test]
fn test_decode_forced_path() {
    let lang = test_lang();
    let resource = trained_resource(&lang, TrainerOptions::default());
    let words = resource.sentence(vec![lang.word("cats"), lang.word("run")]);
    let tags = resource.tags(&words).unwrap().unwrap();
    assert_eq!(tags, vec![lang.noun, lang.verb]);

    // The only feasible path carries the whole probability mass.
    let (tags, probability) = resource.tags_with_probability(&words).unwrap().unwrap();
    assert_eq!(tags, vec![lang.noun, lang.verb]);
    assert!((probability - 1.0).abs() < 1e-6, "{probability}");
}

/// レンマ化がデコード経路から正しいレンマを再構成することのテスト
#[test]
fn test_lemmatize() {
    let lang = test_lang();
    let resource = trained_resource(&lang, TrainerOptions::default());
    let lemmata = resource.lemmatize_text("cats run").unwrap().unwrap();
    assert_eq!(lemmata, vec!["cat".to_string(), "run".to_string()]);

    // Unknown words fall back to their surface form.
    let words = resource.sentence(vec![lang.word("qqq"), lang.word("run")]);
    let lemmata = resource.lemmata(&words).unwrap().unwrap();
    assert_eq!(lemmata[0], "qqq");
}

/// バイグラム表が経路を許さない場合にデコードが不可能を返すことのテスト
#[test]
fn test_decode_infeasible_sentinel() {
    let lang = test_lang();
    // A table without any transition into EOS admits no complete path.
    let samples = vec![lang.sample("cat", "cat", lang.noun)];
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
    let factory = FeatureFunctionFactory::new(
        Arc::new(bank),
        None,
        Arc::new(CharSyllabizer),
        Arc::new(bigrams),
        ScorePolicy::Mixed,
        None,
    )
    .unwrap();
    let weights = vec![0.0; factory.layout().feature_functions_count()];
    let classifier = SentenceClassifier::from_weights(factory, weights).unwrap();
    let words: Arc<[SyllabicWord]> = vec![lang.word("cat")].into();
    assert_eq!(classifier.decode(&words).unwrap(), None);
}

/// オンライン学習の2つのサンプル順序ポリシーのテスト
#[test]
fn test_online_training_orders() {
    let lang = test_lang();
    for order in [SampleOrder::Cyclic, SampleOrder::SeededRandom { seed: 42 }] {
        let options = TrainerOptions {
            crf: CrfTrainingOptions::Online(OnlineOptions {
                order,
                ..OnlineOptions::default()
            }),
            ..TrainerOptions::default()
        };
        let resource = trained_resource(&lang, options);
        let words = resource.sentence(vec![lang.word("cats"), lang.word("run")]);
        let tags = resource.tags(&words).unwrap().unwrap();
        assert_eq!(tags, vec![lang.noun, lang.verb]);
    }
}

/// 文層の検証が強制経路のコーパスで満点になることのテスト
#[test]
fn test_validate_sentence_layer() {
    let lang = test_lang();
    let resource = trained_resource(&lang, TrainerOptions::default());
    let sentences = vec![(
        vec![lang.word("cats"), lang.word("run")],
        vec![lang.noun, lang.verb],
    )];
    let accuracy = resource.validate_sentence_layer(&sentences).unwrap();
    assert_eq!(accuracy, 1.0);

    assert!(matches!(
        resource.validate_sentence_layer(&[]),
        Err(LegatoError::InsufficientData(_))
    ));
}

/// 未学習のリソースでの推論が状態エラーになることのテスト
#[test]
fn test_untrained_resource() {
    let lang = test_lang();
    let resource = LanguageResource::new(
        Arc::new(CharSyllabizer),
        Arc::new(WhitespaceSentenceBreaker),
        Arc::clone(&lang.tag_set),
    );
    let words = resource.sentence(vec![lang.word("cats")]);
    assert!(matches!(
        resource.tags(&words),
        Err(LegatoError::InvalidState(_))
    ));
}

/// 採番モード切り替えで配置が変わった場合の整合性チェックのテスト
#[test]
fn test_toggle_layout_consistency() {
    let lang = test_lang();
    // Two NOUN dictionary classes plus one VERB class: condensing shrinks the
    // feature-id count, so the trained weight vector no longer matches.
    let corpus = Corpus::from_reader(
        "cats\tcat\tNOUN\nfeet\tfoot\tNOUN\nran\trun\tVERB\nEOS\n".as_bytes(),
    )
    .unwrap();
    let mut resource = LanguageResource::new(
        Arc::new(CharSyllabizer),
        Arc::new(WhitespaceSentenceBreaker),
        Arc::clone(&lang.tag_set),
    );
    let options = TrainerOptions {
        word_dropout: 0.9,
        ..TrainerOptions::default()
    };
    Trainer::new(options).train(&mut resource, &corpus).unwrap();

    let words = resource.sentence(vec![lang.word("cats"), lang.word("feet"), lang.word("ran")]);
    assert!(resource.tags(&words).unwrap().is_some());

    resource.set_dictionary_features_condensed(true).unwrap();
    assert!(matches!(
        resource.tags(&words),
        Err(LegatoError::InvalidState(_))
    ));

    // Expanding again restores the original ids and the original layout.
    resource.set_dictionary_features_condensed(false).unwrap();
    assert!(resource.tags(&words).unwrap().is_some());
}

/// 空の語列が引数エラーになることのテスト
#[test]
fn test_empty_words_rejected() {
    let lang = test_lang();
    let resource = trained_resource(&lang, TrainerOptions::default());
    let words: Arc<[SyllabicWord]> = Vec::new().into();
    assert!(matches!(
        resource.tags(&words),
        Err(LegatoError::InvalidArgument(_))
    ));
}

/// 文分割を通したテキストのレンマ化のテスト
#[test]
fn test_lemmatize_empty_text() {
    let lang = test_lang();
    let resource = trained_resource(&lang, TrainerOptions::default());
    assert_eq!(resource.lemmatize_text("").unwrap(), Some(vec![]));
}
