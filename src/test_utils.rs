//! テスト用ユーティリティ
//!
//! テストコードで使用する言語設定とサンプル構築のヘルパーを提供します。

use std::sync::Arc;

use crate::classifier::TrainingSample;
use crate::lang::{CharSyllabizer, Syllabizer};
use crate::tag::{Tag, TagSet, TagSetBuilder};
use crate::transform::{derive_class, ClassRef, TransformInterner};
use crate::word::SyllabicWord;

/// テスト用の言語設定
pub(crate) struct TestLang {
    pub(crate) syllabizer: CharSyllabizer,
    pub(crate) tag_set: Arc<TagSet>,
    pub(crate) noun: Tag,
    pub(crate) verb: Tag,
    pub(crate) punct: Tag,
    pub(crate) interner: Arc<TransformInterner>,
}

/// NOUN・VERB(関連種別)とPUNCT(非関連種別)を持つ言語設定を作成します。
pub(crate) fn test_lang() -> TestLang {
    let mut builder = TagSetBuilder::new();
    let open = builder.add_type("open", false).unwrap();
    let closed = builder.add_type("punct", true).unwrap();
    let noun = builder.add_tag("NOUN", open).unwrap();
    let verb = builder.add_tag("VERB", open).unwrap();
    let punct = builder.add_tag("PUNCT", closed).unwrap();
    TestLang {
        syllabizer: CharSyllabizer,
        tag_set: Arc::new(builder.build()),
        noun,
        verb,
        punct,
        interner: Arc::new(TransformInterner::new()),
    }
}

impl TestLang {
    /// 表層形を語形に変換します。
    pub(crate) fn word(&self, surface: &str) -> SyllabicWord {
        self.syllabizer.segment(surface)
    }

    /// 語形対とタグから変換クラスを導出します。
    pub(crate) fn class(&self, surface: &str, lemma: &str, tag: Tag) -> ClassRef {
        derive_class(
            &self.word(surface),
            &self.word(lemma),
            tag,
            &self.syllabizer,
            &self.interner,
        )
    }

    /// 学習サンプルを構築します。
    pub(crate) fn sample(&self, surface: &str, lemma: &str, tag: Tag) -> TrainingSample {
        TrainingSample::new(self.word(surface), self.class(surface, lemma, tag))
    }
}
