//! 音節単位の語形表現を提供するモジュール
//!
//! このモジュールは、単語を音節列として扱うための不変データ構造を提供します。
//! 語形の等価性は音節列の内容によって決まり、クローンは参照カウントのみで
//! 完了します。

use std::fmt;
use std::sync::Arc;

/// 音節列としての語形
///
/// 音節への分割は言語ごとの[`Syllabizer`](crate::lang::Syllabizer)が行います。
/// 内容による値等価性を持ち、ハッシュも内容から計算されます。
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SyllabicWord {
    syllables: Arc<[String]>,
}

impl SyllabicWord {
    /// 音節列から新しい語形を作成します。
    ///
    /// # 引数
    ///
    /// * `syllables` - 音節のリスト
    ///
    /// # 戻り値
    ///
    /// 作成された語形
    pub fn new(syllables: Vec<String>) -> Self {
        Self {
            syllables: syllables.into(),
        }
    }

    /// 音節のスライスを返します。
    pub fn syllables(&self) -> &[String] {
        &self.syllables
    }

    /// 音節数を返します。
    pub fn len(&self) -> usize {
        self.syllables.len()
    }

    /// 音節を1つも持たない場合に `true` を返します。
    pub fn is_empty(&self) -> bool {
        self.syllables.is_empty()
    }

    /// 全音節を連結した文字列を返します。
    ///
    /// キャッシュのキーやレンマ候補の比較に使用されます。言語固有の表層形の
    /// 復元には [`Syllabizer::reassemble`](crate::lang::Syllabizer::reassemble)
    /// を使用してください。
    pub fn text(&self) -> String {
        self.syllables.concat()
    }
}

impl fmt::Debug for SyllabicWord {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "SyllabicWord({})", self.syllables.join("|"))
    }
}

impl From<Vec<String>> for SyllabicWord {
    fn from(syllables: Vec<String>) -> Self {
        Self::new(syllables)
    }
}
