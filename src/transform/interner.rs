//! コマンド列と変換クラスのインターナー
//!
//! 構造的に等しい値に対して単一の正規[`Arc`]ハンドルを返す、スレッド
//! セーフな内容アドレスマップです。先に書き込んだ側が勝ち、等しい値を
//! 並行して登録したスレッドは全員が同じ正規インスタンスを観測します。

use std::sync::{Arc, Mutex};

use hashbrown::HashSet;

use crate::tag::Tag;
use crate::transform::{ClassRef, CommandSeqRef, CommandSequence, CommandSequenceClass};

/// コマンド列と変換クラスのインターナー
///
/// グローバルなレジストリは持ちません。学習・推論の入口で明示的に共有
/// してください。
#[derive(Default)]
pub struct TransformInterner {
    sequences: Mutex<HashSet<CommandSeqRef>>,
    classes: Mutex<HashSet<ClassRef>>,
}

impl TransformInterner {
    /// 空のインターナーを作成します。
    pub fn new() -> Self {
        Self::default()
    }

    /// コマンド列をインターン化します。
    ///
    /// # 戻り値
    ///
    /// 正規インスタンスへの共有ハンドル。構造的に等しい列に対しては常に
    /// 同一(ポインタ等価)のハンドルが返されます。
    pub fn intern_sequence(&self, sequence: CommandSequence) -> CommandSeqRef {
        let mut set = self.sequences.lock().unwrap();
        if let Some(existing) = set.get(&sequence) {
            return Arc::clone(existing);
        }
        let canonical = Arc::new(sequence);
        set.insert(Arc::clone(&canonical));
        canonical
    }

    /// 変換クラスをインターン化します。
    ///
    /// # 引数
    ///
    /// * `sequence` - インターン化済みのコマンド列
    /// * `tag` - 変換元語形のタグ
    pub fn intern_class(&self, sequence: CommandSeqRef, tag: Tag) -> ClassRef {
        let class = CommandSequenceClass { sequence, tag };
        let mut set = self.classes.lock().unwrap();
        if let Some(existing) = set.get(&class) {
            return Arc::clone(existing);
        }
        let canonical = Arc::new(class);
        set.insert(Arc::clone(&canonical));
        canonical
    }

    /// インターン化済みのコマンド列数を返します。
    pub fn sequence_count(&self) -> usize {
        self.sequences.lock().unwrap().len()
    }

    /// インターン化済みの変換クラス数を返します。
    pub fn class_count(&self) -> usize {
        self.classes.lock().unwrap().len()
    }
}
