//! 有界のMRUキャッシュ
//!
//! サイズ上限付きで、最も使われていないエントリから追い出す小さな
//! キャッシュです。並行アクセスの直列化は呼び出し側のミューテックスが
//! 行い、ミス時の値の構築はロック外で行われます(同一キーの並行ミスでは
//! 構築が複数回走ることを許容します)。

use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::hash::Hash;

use hashbrown::HashMap;

pub(crate) struct MruCache<K, V> {
    capacity: usize,
    stamp: u64,
    map: HashMap<K, (u64, V)>,
    order: BTreeMap<u64, K>,
}

impl<K, V> MruCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            stamp: 0,
            map: HashMap::new(),
            order: BTreeMap::new(),
        }
    }

    /// 値を取得し、エントリを最新に昇格させます。
    pub(crate) fn get<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.stamp += 1;
        let stamp = self.stamp;
        if let Some((slot, value)) = self.map.get_mut(key) {
            let old = *slot;
            *slot = stamp;
            if let Some(k) = self.order.remove(&old) {
                self.order.insert(stamp, k);
            }
            Some(value.clone())
        } else {
            None
        }
    }

    /// 値を登録します。容量を超えた場合は最古のエントリを追い出します。
    pub(crate) fn insert(&mut self, key: K, value: V) {
        if let Some((old, _)) = self.map.get(&key) {
            self.order.remove(old);
        }
        self.stamp += 1;
        self.map.insert(key.clone(), (self.stamp, value));
        self.order.insert(self.stamp, key);
        while self.map.len() > self.capacity {
            if let Some((_, oldest)) = self.order.pop_first() {
                self.map.remove(&oldest);
            } else {
                break;
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.map.len()
    }
}
