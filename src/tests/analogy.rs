use crate::analogy::{normalized_edit_distance, WordFormsDictionary};
use crate::test_utils::test_lang;
use crate::word::SyllabicWord;

/// 正規化編集距離の定義のテスト
#[test]
fn test_normalized_distance() {
    let lang = test_lang();
    let d = normalized_edit_distance(&lang.word("cats"), &lang.word("cat"), &lang.syllabizer);
    assert!((d - 1.0 / 3.0).abs() < 1e-12);

    // Short words fall back to a denominator of one.
    let d = normalized_edit_distance(&lang.word("a"), &lang.word("b"), &lang.syllabizer);
    assert!((d - 1.0).abs() < 1e-12);
}

/// 距離上限内の全登録語形が正確な距離付きで返されることのテスト
#[test]
fn test_search_within_radius() {
    let lang = test_lang();
    let words: Vec<SyllabicWord> = ["cat", "cats", "cart", "dog", "carts"]
        .iter()
        .map(|w| lang.word(w))
        .collect();
    let distance = |a: &SyllabicWord, b: &SyllabicWord| {
        normalized_edit_distance(a, b, &lang.syllabizer)
    };
    let dict = WordFormsDictionary::bulk(words, &distance);
    assert_eq!(dict.len(), 5);

    let hits = dict.search(&lang.word("cat"), 0.4, &distance);
    let mut found: Vec<String> = hits.iter().map(|(w, _)| w.text()).collect();
    found.sort();
    assert_eq!(found, ["cat", "cart", "cats"]);
    for (word, d) in &hits {
        assert!((distance(&lang.word("cat"), word) - d).abs() < 1e-12);
        assert!(*d <= 0.4);
    }
}

/// 重複挿入が無視されることのテスト
#[test]
fn test_insert_dedup() {
    let lang = test_lang();
    let distance = |a: &SyllabicWord, b: &SyllabicWord| {
        normalized_edit_distance(a, b, &lang.syllabizer)
    };
    let mut dict = WordFormsDictionary::new();
    dict.insert(lang.word("cat"), &distance);
    dict.insert(lang.word("cats"), &distance);
    dict.insert(lang.word("cat"), &distance);
    assert_eq!(dict.len(), 2);
}

/// 空の辞書の検索が空の結果を返すことのテスト
#[test]
fn test_empty_dictionary() {
    let lang = test_lang();
    let distance = |a: &SyllabicWord, b: &SyllabicWord| {
        normalized_edit_distance(a, b, &lang.syllabizer)
    };
    let dict = WordFormsDictionary::new();
    assert!(dict.search(&lang.word("cat"), 1.0, &distance).is_empty());
}
