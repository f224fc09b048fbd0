//! # Legato
//!
//! Legatoは、形態的に豊かな言語のための2層統計モデルによる品詞タグ付けと
//! レンマ化の実装です。
//!
//! ## 概要
//!
//! このライブラリは、単独の語形に対してレンマ化の「編集変換」候補を
//! スコア付けする語層と、学習済みの構造制約の下で大域的に最も確からしい
//! タグ・変換系列を選択する文層の、2つの層から構成されます。
//!
//! ## 主な機能
//!
//! - **編集変換の導出**: 動的計画法による音節整列から正規化・インターン化
//!   された編集コマンド列を導出
//! - **語形分類器バンク**: 変換クラスごとの文字列カーネルSVMと例外クラス用
//!   の完全一致辞書。交差検証付き学習と2種類の素性ID採番モードをサポート
//! - **類推強化**: 編集距離の近傍検索辞書を用いた形態的類推によるスコア
//!   強化
//! - **系列モデル**: タグバイグラム制約と固定配置の疎な素性関数による
//!   線形連鎖CRFのタグ付け・レンマ再構成
//! - **学習オーケストレーション**: 依存順の全層学習、交差検証、層別検証
//!   (`train`フィーチャー有効時)
//!
//! ## 使用例
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
//! let corpus = Corpus::from_reader(
//!     "cats\tcat\tNOUN\nrun\trun\tVERB\nEOS\ndogs\tdog\tNOUN\nrun\trun\tVERB\nEOS\n".as_bytes(),
//! )?;
//!
//! let mut resource = LanguageResource::new(
//!     Arc::new(CharSyllabizer),
//!     Arc::new(WhitespaceSentenceBreaker),
//!     tag_set,
//! );
//! Trainer::new(TrainerOptions::default()).train(&mut resource, &corpus)?;
//!
//! let lemmata = resource.lemmatize_text("cats run")?.unwrap();
//! assert_eq!(lemmata.len(), 2);
//! # Ok::<(), legato::errors::LegatoError>(())
//! ```

/// 既知語形の類推検索辞書
pub mod analogy;

/// 語形分類器バンク
pub mod classifier;

/// 線形連鎖CRFエンジン
pub mod crf;

/// エラー型の定義
pub mod errors;

/// 系列モデル向けの素性関数の構築
pub mod features;

/// 言語固有処理との境界トレイト
pub mod lang;

/// 言語ごとの推論リソース
pub mod resource;

/// 語形スコアとスコア取得ポリシー
pub mod score;

/// 文字列カーネルによる二値SVM
pub mod svm;

/// 品詞タグとタグ種別のモデル
pub mod tag;

/// 系列モデルアダプタ
pub mod tagger;

/// 編集変換の導出とインターン化
pub mod transform;

/// 音節単位の語形表現
pub mod word;

/// 学習オーケストレータ
///
/// `train`フィーチャーが有効な場合のみ利用可能です。
#[cfg(feature = "train")]
pub mod trainer;

#[cfg(test)]
mod test_utils;
#[cfg(test)]
mod tests;

// Re-exports
pub use classifier::WordClassifierBank;
pub use resource::LanguageResource;
pub use tagger::SentenceClassifier;

/// このライブラリのバージョン番号
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
