//! 学習サンプルの分割
//!
//! 重複除去済みの語形サンプルを変換クラスごとにまとめ、「分類器向き」の
//! 頻出クラスと「辞書のみ」の例外クラスに分割します。
//!
//! クラスが頻出(分類器向き)となるのは、タグの種別が非関連でなく、かつ
//! クラス頻度がドロップアウト閾値を超える場合に限られます。それ以外の
//! クラスはすべて例外クラスです。頻出クラスには頻度降順で素性ID
//! `0..F-1` が割り当てられ、例外クラスは同じ順序規則で `F..F+E-1` を
//! 引き継ぎます。

use hashbrown::HashMap;

use crate::classifier::TrainingSample;
use crate::tag::TagSet;
use crate::transform::ClassRef;

/// 1つの変換クラスに属するサンプルのグループ
pub(crate) struct ClassGroup {
    pub(crate) class: ClassRef,
    pub(crate) samples: Vec<TrainingSample>,
    pub(crate) frequency: f64,
}

/// 分割結果
///
/// `common` と `exceptional` は互いに素で、全クラスを尽くします。
pub(crate) struct Partition {
    pub(crate) common: Vec<ClassGroup>,
    pub(crate) exceptional: Vec<ClassGroup>,
}

impl Partition {
    /// 頻出クラス数を返します。
    pub(crate) fn common_count(&self) -> usize {
        self.common.len()
    }

    /// 例外クラス数を返します。
    pub(crate) fn exceptional_count(&self) -> usize {
        self.exceptional.len()
    }
}

/// 重複除去済みサンプルをクラスごとに分割します。
///
/// # 引数
///
/// * `samples` - 重複除去済みの学習サンプル
/// * `dropout` - 頻出とみなす最小クラス頻度(この値を超える必要があります)
/// * `tag_set` - タグ種別の問い合わせ先
pub(crate) fn partition(
    samples: &[TrainingSample],
    dropout: f64,
    tag_set: &TagSet,
) -> Partition {
    let total = samples.len();

    // Group by class, remembering first-occurrence order for a deterministic
    // tie-break.
    let mut groups: HashMap<ClassRef, (usize, Vec<TrainingSample>)> = HashMap::new();
    for (index, sample) in samples.iter().enumerate() {
        groups
            .entry(sample.class().clone())
            .or_insert_with(|| (index, vec![]))
            .1
            .push(sample.clone());
    }

    let mut ordered: Vec<(ClassRef, usize, Vec<TrainingSample>)> = groups
        .into_iter()
        .map(|(class, (first, group))| (class, first, group))
        .collect();
    ordered.sort_by(|a, b| b.2.len().cmp(&a.2.len()).then(a.1.cmp(&b.1)));

    let mut common = vec![];
    let mut exceptional = vec![];
    for (class, _, group) in ordered {
        let frequency = if total == 0 {
            0.0
        } else {
            group.len() as f64 / total as f64
        };
        let group = ClassGroup {
            class: class.clone(),
            samples: group,
            frequency,
        };
        if !tag_set.is_unrelated(class.tag()) && frequency > dropout {
            common.push(group);
        } else {
            exceptional.push(group);
        }
    }

    Partition {
        common,
        exceptional,
    }
}
