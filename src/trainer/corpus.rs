//! コーパスデータ構造のモジュール
//!
//! このモジュールは、学習用コーパスの読み込みと管理に必要なデータ構造を
//! 提供します。コーパスファイルは、各行が「表層形\tレンマ\tタグ」の形式
//! で、文の終わりに「EOS」が含まれる形式を想定しています。

use std::io::{BufRead, BufReader, BufWriter, Read, Write};

use crate::errors::{LegatoError, Result};
use crate::trainer::TrainingSource;

/// 表層形・レンマ・タグの3つ組
///
/// 学習データの語を表します。
#[derive(Clone, Debug)]
pub struct Token {
    /// 表層形
    pub surface: String,

    /// レンマ
    pub lemma: String,

    /// タグ名
    pub tag: String,
}

impl Token {
    /// 新しいトークンを作成します。
    pub fn new(surface: &str, lemma: &str, tag: &str) -> Self {
        Self {
            surface: surface.to_string(),
            lemma: lemma.to_string(),
            tag: tag.to_string(),
        }
    }
}

/// 文の表現
///
/// 学習データの1つの例文を表します。
#[derive(Clone, Debug, Default)]
pub struct Example {
    pub(crate) tokens: Vec<Token>,
}

impl Example {
    /// トークンのスライスを返します。
    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// 例文を指定されたシンクに書き込みます。
    ///
    /// # エラー
    ///
    /// 書き込みに失敗した場合、I/Oエラーが返されます。
    pub fn write<W>(&self, wtr: W) -> Result<()>
    where
        W: Write,
    {
        let mut wtr = BufWriter::new(wtr);
        for token in &self.tokens {
            writeln!(&mut wtr, "{}\t{}\t{}", token.surface, token.lemma, token.tag)?;
        }
        writeln!(&mut wtr, "EOS")?;
        Ok(())
    }
}

/// コーパスの表現
///
/// 学習データの例文集合を表します。
#[derive(Default)]
pub struct Corpus {
    pub(crate) examples: Vec<Example>,
}

impl Corpus {
    /// 指定されたシンクからコーパスを読み込みます。
    ///
    /// # 引数
    ///
    /// * `rdr` - コーパスのリーダー
    ///
    /// # 戻り値
    ///
    /// 読み込まれたコーパス
    ///
    /// # エラー
    ///
    /// 入力形式が不正な場合、[`LegatoError`] が返されます。
    pub fn from_reader<R>(rdr: R) -> Result<Self>
    where
        R: Read,
    {
        let buf = BufReader::new(rdr);

        let mut examples = vec![];
        let mut tokens = vec![];
        for line in buf.lines() {
            let line = line?;
            if line == "EOS" {
                if !tokens.is_empty() {
                    examples.push(Example {
                        tokens: std::mem::take(&mut tokens),
                    });
                }
                continue;
            }
            if line.is_empty() {
                continue;
            }
            let mut spl = line.split('\t');
            let surface = spl.next();
            let lemma = spl.next();
            let tag = spl.next();
            let rest = spl.next();
            match (surface, lemma, tag, rest) {
                (Some(surface), Some(lemma), Some(tag), None) => {
                    tokens.push(Token::new(surface, lemma, tag));
                }
                _ => {
                    return Err(LegatoError::invalid_format(
                        "corpus",
                        format!("invalid line: {line}"),
                    ));
                }
            }
        }
        if !tokens.is_empty() {
            examples.push(Example { tokens });
        }
        Ok(Self { examples })
    }

    /// 例文のスライスを返します。
    pub fn examples(&self) -> &[Example] {
        &self.examples
    }

    /// 例文の数を返します。
    pub fn len(&self) -> usize {
        self.examples.len()
    }

    /// 例文を1つも持たない場合に `true` を返します。
    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }
}

impl TrainingSource for Corpus {
    fn word_records(&self) -> Vec<Token> {
        self.examples
            .iter()
            .flat_map(|e| e.tokens.iter().cloned())
            .collect()
    }

    fn tagged_sentences(&self) -> Vec<Vec<Token>> {
        self.examples.iter().map(|e| e.tokens.clone()).collect()
    }
}
