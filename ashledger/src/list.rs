//! 可変長リストの操作をまとめたヘルパー。
//!
//! すべて`Vec`の上の薄い関数で、ハッシュは使わない。

use crate::{Error, Result};

/// 末尾に1要素追加する
///
/// 確保に失敗した場合はリストを変更せずに`Error::MemoryExhausted`を返す。
pub fn append<T>(list: &mut Vec<T>, value: T) -> Result<()> {
    list.try_reserve(1).map_err(|_| Error::MemoryExhausted)?;
    list.push(value);
    Ok(())
}

/// `index`の要素を取り除き、後ろの要素を1つずつ前に詰める
///
/// 範囲外の`index`は何もしない。
pub fn remove_at<T>(list: &mut Vec<T>, index: usize) -> Option<T> {
    if index < list.len() {
        Some(list.remove(index))
    } else {
        None
    }
}

/// 隣り合った重複だけを取り除く
///
/// 離れた位置の重複は残る。全体から重複を消したい場合は先にソートしておくこと。
pub fn dedup_adjacent<T: PartialEq>(list: &mut Vec<T>) {
    list.dedup();
}

/// 要素と確保済みの領域をすべて解放する
pub fn free<T>(list: &mut Vec<T>) {
    list.clear();
    list.shrink_to_fit();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_preserves_existing_elements() {
        let mut list = vec!["a", "b"];
        append(&mut list, "c").unwrap();
        assert_eq!(list, ["a", "b", "c"]);
    }

    #[test]
    fn remove_at_shifts_left() {
        let mut list = vec![1, 2, 3, 4];
        assert_eq!(remove_at(&mut list, 1), Some(2));
        assert_eq!(list, [1, 3, 4]);
    }

    #[test]
    fn remove_at_out_of_range_is_a_no_op() {
        let mut list = vec![1, 2];
        assert_eq!(remove_at(&mut list, 2), None);
        assert_eq!(list, [1, 2]);

        let mut empty: Vec<i32> = Vec::new();
        assert_eq!(remove_at(&mut empty, 0), None);
    }

    #[test]
    fn dedup_only_touches_adjacent_duplicates() {
        let mut list = vec!["A", "B", "A"];
        dedup_adjacent(&mut list);
        assert_eq!(list, ["A", "B", "A"]);

        let mut list = vec!["A", "A", "B", "B", "B", "A"];
        dedup_adjacent(&mut list);
        assert_eq!(list, ["A", "B", "A"]);
    }

    #[test]
    fn free_releases_storage() {
        let mut list = Vec::with_capacity(16);
        list.push(1);
        free(&mut list);
        assert!(list.is_empty());
        assert_eq!(list.capacity(), 0);
    }
}
