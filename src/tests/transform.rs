use std::sync::Arc;

use crate::test_utils::test_lang;
use crate::transform::{derive_class, derive_sequence, edit_distance, EditCommand};

/// 導出したコマンド列の再適用が常に変換先を再現することのテスト
#[test]
fn test_round_trip() {
    let lang = test_lang();
    let pairs = [
        ("cats", "cat"),
        ("cat", "cat"),
        ("mice", "mouse"),
        ("ran", "run"),
        ("went", "go"),
        ("a", "ab"),
    ];
    for (source, target) in pairs {
        let source = lang.word(source);
        let target = lang.word(target);
        let sequence = derive_sequence(&source, &target, &lang.syllabizer, &lang.interner);
        assert_eq!(
            sequence.apply(source.syllables()).as_deref(),
            Some(target.syllables()),
            "{source:?} -> {target:?}"
        );
    }
}

/// 恒等変換が空のコマンド列になることのテスト
#[test]
fn test_identity_is_empty() {
    let lang = test_lang();
    let word = lang.word("cat");
    let sequence = derive_sequence(&word, &word, &lang.syllabizer, &lang.interner);
    assert!(sequence.is_empty());
}

/// 末尾音節の削除が1つの削除コマンドになることのテスト
#[test]
fn test_single_trailing_delete() {
    let lang = test_lang();
    let sequence = derive_sequence(
        &lang.word("cats"),
        &lang.word("cat"),
        &lang.syllabizer,
        &lang.interner,
    );
    assert_eq!(sequence.len(), 1);
    assert!(matches!(
        sequence.commands()[0],
        EditCommand::Delete { index: 3 }
    ));
}

/// 構造的に等しい対が常に同一の正規インスタンスを得ることのテスト
#[test]
fn test_interning_law() {
    let lang = test_lang();
    let a = derive_sequence(
        &lang.word("cats"),
        &lang.word("cat"),
        &lang.syllabizer,
        &lang.interner,
    );
    // A structurally identical transformation derived from different words.
    let b = derive_sequence(
        &lang.word("dogs"),
        &lang.word("dog"),
        &lang.syllabizer,
        &lang.interner,
    );
    assert!(!Arc::ptr_eq(&a, &b));

    let c = derive_sequence(
        &lang.word("cats"),
        &lang.word("cat"),
        &lang.syllabizer,
        &lang.interner,
    );
    assert!(Arc::ptr_eq(&a, &c));

    // Same suffix deletion at the same index interns to one instance.
    let d = derive_sequence(
        &lang.word("bats"),
        &lang.word("bat"),
        &lang.syllabizer,
        &lang.interner,
    );
    assert!(Arc::ptr_eq(&a, &d));
}

/// 変換クラスのインターン化がタグで区別されることのテスト
#[test]
fn test_class_interning() {
    let lang = test_lang();
    let a = derive_class(
        &lang.word("cats"),
        &lang.word("cat"),
        lang.noun,
        &lang.syllabizer,
        &lang.interner,
    );
    let b = derive_class(
        &lang.word("bats"),
        &lang.word("bat"),
        lang.noun,
        &lang.syllabizer,
        &lang.interner,
    );
    assert!(Arc::ptr_eq(&a, &b));

    let c = derive_class(
        &lang.word("cats"),
        &lang.word("cat"),
        lang.verb,
        &lang.syllabizer,
        &lang.interner,
    );
    assert!(!Arc::ptr_eq(&a, &c));
    assert!(Arc::ptr_eq(a.sequence(), c.sequence()));
}

/// 別の語形対から導出したコマンド列が適用不能な場合のテスト
#[test]
fn test_apply_incompatible() {
    let lang = test_lang();
    let sequence = derive_sequence(
        &lang.word("cats"),
        &lang.word("cat"),
        &lang.syllabizer,
        &lang.interner,
    );
    assert_eq!(sequence.apply(lang.word("ab").syllables()), None);
}

/// 編集距離の基本的な性質のテスト
#[test]
fn test_edit_distance() {
    let lang = test_lang();
    let cat = lang.word("cat");
    let cats = lang.word("cats");
    assert_eq!(edit_distance(&cat, &cat, &lang.syllabizer), 0.0);
    assert_eq!(edit_distance(&cats, &cat, &lang.syllabizer), 1.0);
    assert_eq!(edit_distance(&cat, &cats, &lang.syllabizer), 1.0);
}
