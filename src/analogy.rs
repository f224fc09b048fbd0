//! 既知語形の類推検索辞書
//!
//! このモジュールは、音節列の編集距離による近傍検索を提供する語形辞書
//! ([`WordFormsDictionary`])を実装します。学習データ中の全既知語形から
//! 一度だけ構築され、形態的に類似した既知語を使ったスコア強化
//! ([`crate::classifier::WordClassifierBank::analogy_score_bank`])の
//! 近傍供給源になります。
//!
//! 内部構造は距離木(BK木)の変種です。子エッジは量子化された距離で
//! 張られ、探索時には量子化幅と正規化距離の近似性を考慮した余裕を
//! 持って枝刈りします。返される距離は常に与えられた距離関数の正確な
//! 値です。

use crate::lang::Syllabizer;
use crate::transform::edit_distance;
use crate::word::SyllabicWord;

/// 子エッジの距離量子化幅
const BUCKET: f64 = 0.25;

/// 距離関数
pub type DistanceFn<'a> = &'a (dyn Fn(&SyllabicWord, &SyllabicWord) -> f64 + Sync);

/// 正規化音節編集距離を計算します。
///
/// 生の編集距離を `max(max(len_a, len_b) - 1, 1)` で割った値です。
/// 類推検索の標準の距離関数として使用されます。
pub fn normalized_edit_distance(
    a: &SyllabicWord,
    b: &SyllabicWord,
    syllabizer: &dyn Syllabizer,
) -> f64 {
    let raw = edit_distance(a, b, syllabizer);
    let denom = a.len().max(b.len()).saturating_sub(1).max(1);
    raw / denom as f64
}

struct Node {
    word: SyllabicWord,
    // (quantized distance to the child, node index)
    children: Vec<(i64, usize)>,
}

/// 既知語形の類推検索辞書
///
/// # 使用例
///
/// ```
/// use legato::analogy::{normalized_edit_distance, WordFormsDictionary};
/// use legato::lang::{CharSyllabizer, Syllabizer};
///
/// let syl = CharSyllabizer;
/// let words = ["cat", "cats", "dog"]
///     .iter()
///     .map(|w| syl.segment(w))
///     .collect::<Vec<_>>();
/// let dist = |a: &_, b: &_| normalized_edit_distance(a, b, &syl);
/// let dict = WordFormsDictionary::bulk(words, &dist);
///
/// let hits = dict.search(&syl.segment("cat"), 0.5, &dist);
/// assert!(hits.iter().any(|(w, _)| w.text() == "cats"));
/// ```
#[derive(Default)]
pub struct WordFormsDictionary {
    nodes: Vec<Node>,
}

impl WordFormsDictionary {
    /// 空の辞書を作成します。
    pub fn new() -> Self {
        Self::default()
    }

    /// 語形の集まりから辞書を一括構築します。
    ///
    /// # 引数
    ///
    /// * `words` - 既知語形
    /// * `distance` - 構築と検索で一貫して使用する距離関数
    pub fn bulk<I>(words: I, distance: DistanceFn) -> Self
    where
        I: IntoIterator<Item = SyllabicWord>,
    {
        let mut dict = Self::new();
        for word in words {
            dict.insert(word, distance);
        }
        dict
    }

    /// 語形を辞書に登録します。
    ///
    /// すでに登録済み(距離0の既存ノードが存在)の場合は何もしません。
    ///
    /// # 引数
    ///
    /// * `word` - 登録する語形
    /// * `distance` - 構築と検索で一貫して使用する距離関数
    pub fn insert(&mut self, word: SyllabicWord, distance: DistanceFn) {
        if self.nodes.is_empty() {
            self.nodes.push(Node {
                word,
                children: vec![],
            });
            return;
        }
        let mut current = 0;
        loop {
            let d = distance(&self.nodes[current].word, &word);
            if d == 0.0 && self.nodes[current].word == word {
                return;
            }
            let bucket = quantize(d);
            match self.nodes[current]
                .children
                .iter()
                .find(|(b, _)| *b == bucket)
            {
                Some(&(_, child)) => current = child,
                None => {
                    let index = self.nodes.len();
                    self.nodes.push(Node {
                        word,
                        children: vec![],
                    });
                    self.nodes[current].children.push((bucket, index));
                    return;
                }
            }
        }
    }

    /// 登録済みの語形数を返します。
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// 語形を1つも持たない場合に `true` を返します。
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// 最大距離以内の全登録語形を距離付きで返します。
    ///
    /// # 引数
    ///
    /// * `query` - 問い合わせ語形
    /// * `max_distance` - 距離の上限(両端含む)
    /// * `distance` - 構築時と同じ距離関数
    ///
    /// # 戻り値
    ///
    /// `(語形, 距離)` のリスト
    pub fn search(
        &self,
        query: &SyllabicWord,
        max_distance: f64,
        distance: DistanceFn,
    ) -> Vec<(SyllabicWord, f64)> {
        let mut hits = vec![];
        if self.nodes.is_empty() || max_distance < 0.0 {
            return hits;
        }
        let mut stack = vec![0];
        while let Some(current) = stack.pop() {
            let node = &self.nodes[current];
            let d = distance(query, &node.word);
            if d <= max_distance {
                hits.push((node.word.clone(), d));
            }
            // The normalized distance is only approximately metric, so the
            // triangle-inequality window is widened by two buckets on each
            // side.
            let lo = d - max_distance - 2.0 * BUCKET;
            let hi = d + max_distance + 2.0 * BUCKET;
            for &(bucket, child) in &node.children {
                let edge = bucket as f64 * BUCKET;
                if edge >= lo && edge <= hi {
                    stack.push(child);
                }
            }
        }
        hits
    }
}

fn quantize(d: f64) -> i64 {
    (d / BUCKET).round() as i64
}
