//! 語形間の編集変換の導出
//!
//! このモジュールは、語形(音節列)から目的のレンマへ変換するための編集
//! コマンド列を導出します。動的計画法による最小コスト整列を計算し、整列
//! 結果を追加・削除・置換のコマンド列([`CommandSequence`])に翻訳します。
//!
//! 構造的に等しいコマンド列はプロセス内で単一の正規インスタンスを共有
//! します(インターン化)。後段のアルゴリズムがホットループ内で参照比較に
//! よる等価判定を行うこと、および素性IDが出現ごとではなく相異なるクラス
//! ごとに一度だけ割り当てられることがその理由です。
//!
//! # 使用例
//!
//! ```
//! use legato::lang::{CharSyllabizer, Syllabizer};
//! use legato::tag::TagSetBuilder;
//! use legato::transform::{derive_class, TransformInterner};
//!
//! let syl = CharSyllabizer;
//! let mut builder = TagSetBuilder::new();
//! let open = builder.add_type("open", false)?;
//! let noun = builder.add_tag("NOUN", open)?;
//! let tag_set = builder.build();
//!
//! let interner = TransformInterner::new();
//! let class = derive_class(
//!     &syl.segment("cats"),
//!     &syl.segment("cat"),
//!     noun,
//!     &syl,
//!     &interner,
//! );
//! assert_eq!(class.sequence().len(), 1);
//! # Ok::<(), legato::errors::LegatoError>(())
//! ```

mod interner;

use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::lang::Syllabizer;
use crate::tag::Tag;
use crate::word::SyllabicWord;

pub use crate::transform::interner::TransformInterner;

/// 挿入・削除の単位コスト
const INDEL_COST: f64 = 1.0;

/// 編集コマンド
///
/// いずれのバリアントも変換元の音節インデックスを保持します。
/// `Replace` は導出時の音節対の置換コストを併せて保持しますが、コストは
/// 変換の同一性には含まれません(等価性・ハッシュはコストを無視します)。
#[derive(Clone, Debug)]
pub enum EditCommand {
    /// 変換元インデックス `index` の直前に音節を挿入します。
    Add {
        /// 挿入位置
        index: usize,
        /// 挿入する音節
        syllable: String,
    },
    /// 変換元インデックス `index` の音節を削除します。
    Delete {
        /// 削除位置
        index: usize,
    },
    /// 変換元インデックス `index` の音節を置換します。
    Replace {
        /// 置換位置
        index: usize,
        /// 置換後の音節
        syllable: String,
        /// 導出時の音節対の置換コスト
        cost: f64,
    },
}

impl EditCommand {
    /// 変換元インデックスを返します。
    pub fn index(&self) -> usize {
        match self {
            Self::Add { index, .. } | Self::Delete { index } | Self::Replace { index, .. } => {
                *index
            }
        }
    }
}

impl PartialEq for EditCommand {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                Self::Add { index: a, syllable: s },
                Self::Add {
                    index: b,
                    syllable: t,
                },
            ) => a == b && s == t,
            (Self::Delete { index: a }, Self::Delete { index: b }) => a == b,
            (
                Self::Replace {
                    index: a,
                    syllable: s,
                    ..
                },
                Self::Replace {
                    index: b,
                    syllable: t,
                    ..
                },
            ) => a == b && s == t,
            _ => false,
        }
    }
}

impl Eq for EditCommand {}

impl Hash for EditCommand {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Self::Add { index, syllable } => {
                0u8.hash(state);
                index.hash(state);
                syllable.hash(state);
            }
            Self::Delete { index } => {
                1u8.hash(state);
                index.hash(state);
            }
            Self::Replace {
                index, syllable, ..
            } => {
                2u8.hash(state);
                index.hash(state);
                syllable.hash(state);
            }
        }
    }
}

/// 編集コマンド列
///
/// ある語形を別の語形へ変換する決定的なコマンド列です。構造的に等しい
/// 列は[`TransformInterner`]によって単一の正規インスタンスを共有します。
#[derive(PartialEq, Eq, Hash, Debug)]
pub struct CommandSequence {
    commands: Vec<EditCommand>,
}

/// インターン化されたコマンド列への共有ハンドル
pub type CommandSeqRef = Arc<CommandSequence>;

impl CommandSequence {
    /// コマンドのスライスを返します。
    pub fn commands(&self) -> &[EditCommand] {
        &self.commands
    }

    /// コマンド数を返します。
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// 恒等変換(空のコマンド列)の場合に `true` を返します。
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// コマンド列を音節列に適用します。
    ///
    /// コマンド列は別の語形対から導出されたものである可能性があるため、
    /// 与えられた音節列に構造的に適用できない場合があります。その場合は
    /// `None` を返します。
    ///
    /// # 引数
    ///
    /// * `syllables` - 変換元の音節列
    ///
    /// # 戻り値
    ///
    /// 変換後の音節列。適用不能な場合は `None`
    pub fn apply(&self, syllables: &[String]) -> Option<Vec<String>> {
        let mut out = Vec::with_capacity(syllables.len() + 2);
        let mut src = 0;
        for cmd in &self.commands {
            let index = cmd.index();
            if index < src || index > syllables.len() {
                return None;
            }
            while src < index {
                out.push(syllables[src].clone());
                src += 1;
            }
            match cmd {
                EditCommand::Add { syllable, .. } => out.push(syllable.clone()),
                EditCommand::Delete { .. } => {
                    if src >= syllables.len() {
                        return None;
                    }
                    src += 1;
                }
                EditCommand::Replace { syllable, .. } => {
                    if src >= syllables.len() {
                        return None;
                    }
                    out.push(syllable.clone());
                    src += 1;
                }
            }
        }
        out.extend(syllables[src..].iter().cloned());
        Some(out)
    }

    /// コマンド列を語形に適用します。
    ///
    /// [`CommandSequence::apply`]の[`SyllabicWord`]版です。
    pub fn apply_to_word(&self, word: &SyllabicWord) -> Option<SyllabicWord> {
        self.apply(word.syllables()).map(SyllabicWord::new)
    }
}

/// タグ付き変換クラス
///
/// コマンド列を変換元語形の品詞タグで修飾したものです。語形サンプルが
/// 「どのタグの下でどの変換を行うか」を表す単位であり、コマンド列と同様
/// にインターン化されます。
#[derive(PartialEq, Eq, Hash, Debug)]
pub struct CommandSequenceClass {
    sequence: CommandSeqRef,
    tag: Tag,
}

/// インターン化された変換クラスへの共有ハンドル
pub type ClassRef = Arc<CommandSequenceClass>;

impl CommandSequenceClass {
    /// コマンド列を返します。
    pub fn sequence(&self) -> &CommandSeqRef {
        &self.sequence
    }

    /// タグを返します。
    pub fn tag(&self) -> Tag {
        self.tag
    }
}

/// 2語形間の最小コスト編集距離を計算します。
///
/// 置換コストは音節化器の[`Syllabizer::distance`]、挿入・削除コストは
/// 単位コストです。
///
/// # 引数
///
/// * `source` - 変換元語形
/// * `target` - 変換先語形
/// * `syllabizer` - 音節間距離を提供する音節化器
///
/// # 戻り値
///
/// 編集距離
pub fn edit_distance(
    source: &SyllabicWord,
    target: &SyllabicWord,
    syllabizer: &dyn Syllabizer,
) -> f64 {
    let matrix = cost_matrix(source.syllables(), target.syllables(), syllabizer);
    matrix[matrix.len() - 1]
}

// Fills the (n+1) x (m+1) DP cost matrix, row-major.
fn cost_matrix(source: &[String], target: &[String], syllabizer: &dyn Syllabizer) -> Vec<f64> {
    let n = source.len();
    let m = target.len();
    let width = m + 1;
    let mut d = vec![0.0; (n + 1) * width];
    for j in 1..=m {
        d[j] = d[j - 1] + INDEL_COST;
    }
    for i in 1..=n {
        d[i * width] = d[(i - 1) * width] + INDEL_COST;
        for j in 1..=m {
            let sub = d[(i - 1) * width + j - 1] + syllabizer.distance(&source[i - 1], &target[j - 1]);
            let del = d[(i - 1) * width + j] + INDEL_COST;
            let add = d[i * width + j - 1] + INDEL_COST;
            d[i * width + j] = sub.min(del).min(add);
        }
    }
    d
}

/// 変換元語形を変換先語形へ変換するコマンド列を導出し、インターン化された
/// 正規インスタンスを返します。
///
/// # 引数
///
/// * `source` - 変換元語形
/// * `target` - 変換先語形(レンマ)
/// * `syllabizer` - 音節間距離を提供する音節化器
/// * `interner` - コマンド列のインターナー
pub fn derive_sequence(
    source: &SyllabicWord,
    target: &SyllabicWord,
    syllabizer: &dyn Syllabizer,
    interner: &TransformInterner,
) -> CommandSeqRef {
    let src = source.syllables();
    let tgt = target.syllables();
    let d = cost_matrix(src, tgt, syllabizer);
    let width = tgt.len() + 1;

    // Walk the matrix back from (n, m), collecting commands in reverse.
    // Tie-breaking prefers substitution, then deletion, then insertion, so
    // structurally identical pairs always derive the same sequence.
    let mut commands = vec![];
    let mut i = src.len();
    let mut j = tgt.len();
    while i > 0 || j > 0 {
        let here = d[i * width + j];
        if i > 0 && j > 0 {
            let cost = syllabizer.distance(&src[i - 1], &tgt[j - 1]);
            if (here - (d[(i - 1) * width + j - 1] + cost)).abs() < f64::EPSILON {
                if src[i - 1] != tgt[j - 1] {
                    commands.push(EditCommand::Replace {
                        index: i - 1,
                        syllable: tgt[j - 1].clone(),
                        cost,
                    });
                }
                i -= 1;
                j -= 1;
                continue;
            }
        }
        if i > 0 && (here - (d[(i - 1) * width + j] + INDEL_COST)).abs() < f64::EPSILON {
            commands.push(EditCommand::Delete { index: i - 1 });
            i -= 1;
            continue;
        }
        commands.push(EditCommand::Add {
            index: i,
            syllable: tgt[j - 1].clone(),
        });
        j -= 1;
    }
    commands.reverse();

    let sequence = interner.intern_sequence(CommandSequence { commands });
    debug_assert_eq!(
        sequence.apply(src).as_deref(),
        Some(tgt),
        "derived command sequence must reproduce the target word"
    );
    sequence
}

/// 語形対とタグから変換クラスを導出し、インターン化された正規インスタンス
/// を返します。
///
/// # 引数
///
/// * `source` - 変換元語形
/// * `target` - 変換先語形(レンマ)
/// * `tag` - 変換元語形の品詞タグ
/// * `syllabizer` - 音節間距離を提供する音節化器
/// * `interner` - コマンド列と変換クラスのインターナー
pub fn derive_class(
    source: &SyllabicWord,
    target: &SyllabicWord,
    tag: Tag,
    syllabizer: &dyn Syllabizer,
    interner: &TransformInterner,
) -> ClassRef {
    let sequence = derive_sequence(source, target, syllabizer, interner);
    interner.intern_class(sequence, tag)
}
