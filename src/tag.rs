//! 品詞タグとタグ種別のモデル
//!
//! このモジュールは、品詞タグ([`Tag`])、タグ種別([`TagType`])、および
//! それらを所有するタグ集合([`TagSet`])を提供します。タグ集合は言語設定
//! ごとに一度だけ構築され、以降は読み取り専用で共有されます。
//!
//! タグ種別には「非関連」フラグがあります。非関連種別のタグは本質的に
//! 単数的・分析不能なカテゴリであり、変換クラスの分類器学習や類推による
//! スコア強化の対象外になります。
//!
//! 系列層のために、境界タグ(BOS/EOS)が専用の境界種別として常に予約されます。

use hashbrown::HashMap;

use crate::errors::{LegatoError, Result};

/// 品詞タグ
///
/// [`TagSet`]へのインデックスを保持する軽量なコピー型です。
/// 名前や種別の問い合わせは所有するタグ集合に対して行います。
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
pub struct Tag(pub(crate) u16);

impl Tag {
    /// タグIDを返します。
    #[inline(always)]
    pub fn id(self) -> u16 {
        self.0
    }
}

/// タグ種別のID
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct TagTypeId(pub(crate) u16);

/// タグ種別
#[derive(Debug)]
pub struct TagType {
    name: String,

    // Tags of an unrelated type are inherently singular and take no part in
    // classifier training or analogy reinforcement.
    unrelated: bool,
}

impl TagType {
    /// 種別名を返します。
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 非関連種別の場合に `true` を返します。
    pub fn is_unrelated(&self) -> bool {
        self.unrelated
    }
}

struct TagDef {
    name: String,
    tag_type: TagTypeId,
}

/// タグ集合
///
/// すべてのタグとタグ種別を所有し、名前からの解決と種別の問い合わせを
/// 提供します。[`TagSetBuilder`]で構築します。
pub struct TagSet {
    tags: Vec<TagDef>,
    types: Vec<TagType>,
    tag_by_name: HashMap<String, Tag>,
}

/// 境界種別の予約名
const BOUNDARY_TYPE: &str = "__boundary__";

/// 文頭境界タグの予約名
const BOS_NAME: &str = "BOS";

/// 文末境界タグの予約名
const EOS_NAME: &str = "EOS";

impl TagSet {
    /// 文頭境界タグを返します。
    #[inline(always)]
    pub fn bos(&self) -> Tag {
        Tag(0)
    }

    /// 文末境界タグを返します。
    #[inline(always)]
    pub fn eos(&self) -> Tag {
        Tag(1)
    }

    /// 名前からタグを解決します。
    ///
    /// # 引数
    ///
    /// * `name` - タグ名
    ///
    /// # 戻り値
    ///
    /// 見つかった場合はタグ、見つからない場合は `None`
    pub fn tag(&self, name: &str) -> Option<Tag> {
        self.tag_by_name.get(name).copied()
    }

    /// タグの名前を返します。
    pub fn tag_name(&self, tag: Tag) -> &str {
        &self.tags[usize::from(tag.0)].name
    }

    /// タグの種別IDを返します。
    pub fn tag_type_of(&self, tag: Tag) -> TagTypeId {
        self.tags[usize::from(tag.0)].tag_type
    }

    /// タグ種別を返します。
    pub fn tag_type(&self, id: TagTypeId) -> &TagType {
        &self.types[usize::from(id.0)]
    }

    /// タグの種別が非関連の場合に `true` を返します。
    #[inline]
    pub fn is_unrelated(&self, tag: Tag) -> bool {
        self.types[usize::from(self.tags[usize::from(tag.0)].tag_type.0)].unrelated
    }

    /// 境界タグの場合に `true` を返します。
    #[inline]
    pub fn is_boundary(&self, tag: Tag) -> bool {
        tag.0 < 2
    }

    /// タグ数(境界タグを含む)を返します。
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    /// タグを1つも持たない場合に `true` を返します。境界タグは常に存在する
    /// ため、この関数は `false` を返します。
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// 境界タグを除く全タグを列挙します。
    pub fn regular_tags(&self) -> impl Iterator<Item = Tag> + '_ {
        (2..self.tags.len()).map(|i| Tag(u16::try_from(i).unwrap()))
    }
}

/// [`TagSet`]のビルダー
///
/// 境界タグ(BOS/EOS)は自動的に予約されます。
///
/// # 使用例
///
/// ```
/// use legato::tag::TagSetBuilder;
///
/// let mut builder = TagSetBuilder::new();
/// let related = builder.add_type("open", false)?;
/// let unrelated = builder.add_type("punct", true)?;
/// builder.add_tag("NOUN", related)?;
/// builder.add_tag("PUNCT", unrelated)?;
/// let tag_set = builder.build();
///
/// let noun = tag_set.tag("NOUN").unwrap();
/// assert!(!tag_set.is_unrelated(noun));
/// # Ok::<(), legato::errors::LegatoError>(())
/// ```
pub struct TagSetBuilder {
    tags: Vec<TagDef>,
    types: Vec<TagType>,
    tag_by_name: HashMap<String, Tag>,
}

impl Default for TagSetBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TagSetBuilder {
    /// 境界タグだけを持つ新しいビルダーを作成します。
    pub fn new() -> Self {
        let types = vec![TagType {
            name: BOUNDARY_TYPE.to_string(),
            unrelated: true,
        }];
        let tags = vec![
            TagDef {
                name: BOS_NAME.to_string(),
                tag_type: TagTypeId(0),
            },
            TagDef {
                name: EOS_NAME.to_string(),
                tag_type: TagTypeId(0),
            },
        ];
        let mut tag_by_name = HashMap::new();
        tag_by_name.insert(BOS_NAME.to_string(), Tag(0));
        tag_by_name.insert(EOS_NAME.to_string(), Tag(1));
        Self {
            tags,
            types,
            tag_by_name,
        }
    }

    /// タグ種別を追加します。
    ///
    /// # 引数
    ///
    /// * `name` - 種別名
    /// * `unrelated` - 非関連種別の場合は `true`
    ///
    /// # エラー
    ///
    /// 種別数が上限を超えた場合、[`LegatoError`]が返されます。
    pub fn add_type(&mut self, name: &str, unrelated: bool) -> Result<TagTypeId> {
        let id = u16::try_from(self.types.len())
            .map_err(|_| LegatoError::invalid_argument("name", "too many tag types"))?;
        self.types.push(TagType {
            name: name.to_string(),
            unrelated,
        });
        Ok(TagTypeId(id))
    }

    /// タグを追加します。
    ///
    /// # 引数
    ///
    /// * `name` - タグ名(集合内で一意)
    /// * `tag_type` - 所属する種別
    ///
    /// # エラー
    ///
    /// 名前が重複する場合や予約名の場合、[`LegatoError`]が返されます。
    pub fn add_tag(&mut self, name: &str, tag_type: TagTypeId) -> Result<Tag> {
        if self.tag_by_name.contains_key(name) {
            return Err(LegatoError::invalid_argument(
                "name",
                format!("duplicate tag name: {name}"),
            ));
        }
        if usize::from(tag_type.0) >= self.types.len() {
            return Err(LegatoError::invalid_argument(
                "tag_type",
                "unknown tag type id",
            ));
        }
        let id = u16::try_from(self.tags.len())
            .map_err(|_| LegatoError::invalid_argument("name", "too many tags"))?;
        self.tags.push(TagDef {
            name: name.to_string(),
            tag_type,
        });
        self.tag_by_name.insert(name.to_string(), Tag(id));
        Ok(Tag(id))
    }

    /// タグ集合を構築します。
    pub fn build(self) -> TagSet {
        TagSet {
            tags: self.tags,
            types: self.types,
            tag_by_name: self.tag_by_name,
        }
    }
}
