pub mod ordered_list {
    use std::cmp::Ordering;

    pub type Comparator<T> = fn(&T, &T) -> Ordering;

    /// Index-addressed list that optionally keeps itself sorted.
    ///
    /// with a comparator installed, insert places a new item after every
    /// item that does not compare greater, so equal keys keep their
    /// insertion order. without one it is a plain append list.
    pub struct OrderedList<T> {
        items: Vec<T>,
        cmp: Option<Comparator<T>>,
    }

    impl<T> Default for OrderedList<T> {
        fn default() -> OrderedList<T> {
            OrderedList {
                items: Vec::new(),
                cmp: None,
            }
        }
    }

    impl<T> OrderedList<T> {
        pub fn new() -> OrderedList<T> {
            OrderedList::default()
        }

        pub fn with_comparator(cmp: Comparator<T>) -> OrderedList<T> {
            OrderedList {
                items: Vec::new(),
                cmp: Some(cmp),
            }
        }

        // existing items are re-sorted (stably) under the new order.
        pub fn set_comparator(&mut self, cmp: Comparator<T>) {
            self.items.sort_by(cmp);
            self.cmp = Some(cmp);
        }

        /// insert by comparator, returning the index the item landed at.
        pub fn insert(&mut self, item: T) -> usize {
            let idx = match self.cmp {
                Some(cmp) => self
                    .items
                    .iter()
                    .position(|existing| cmp(&item, existing) == Ordering::Less)
                    .unwrap_or(self.items.len()),
                None => self.items.len(),
            };
            self.items.insert(idx, item);
            idx
        }

        // explicit placement; callers own the ordering when they use this.
        pub fn insert_at(&mut self, idx: usize, item: T) {
            let idx = idx.min(self.items.len());
            self.items.insert(idx, item);
        }

        pub fn remove_at(&mut self, idx: usize) -> Option<T> {
            if idx < self.items.len() {
                Some(self.items.remove(idx))
            } else {
                None
            }
        }

        pub fn position<P: FnMut(&T) -> bool>(&self, pred: P) -> Option<usize> {
            self.items.iter().position(pred)
        }

        pub fn find<P: FnMut(&&T) -> bool>(&self, pred: P) -> Option<&T> {
            self.items.iter().find(pred)
        }

        pub fn get(&self, idx: usize) -> Option<&T> {
            self.items.get(idx)
        }

        pub fn first(&self) -> Option<&T> {
            self.items.first()
        }

        pub fn pop_front(&mut self) -> Option<T> {
            self.remove_at(0)
        }

        pub fn len(&self) -> usize {
            self.items.len()
        }

        pub fn is_empty(&self) -> bool {
            self.items.is_empty()
        }

        pub fn iter(&self) -> std::slice::Iter<'_, T> {
            self.items.iter()
        }
    }

    #[cfg(test)]
    mod tests {
        use super::OrderedList;

        fn by_key(a: &(u8, char), b: &(u8, char)) -> std::cmp::Ordering {
            a.0.cmp(&b.0)
        }

        #[test]
        fn equal_keys_keep_insertion_order() {
            let mut list = OrderedList::with_comparator(by_key);
            list.insert((2, 'a'));
            list.insert((1, 'b'));
            list.insert((2, 'c'));
            list.insert((1, 'd'));
            let order: Vec<char> = list.iter().map(|item| item.1).collect();
            assert_eq!(order, vec!['b', 'd', 'a', 'c']);
        }

        #[test]
        fn unsorted_list_appends() {
            let mut list = OrderedList::new();
            list.insert(3);
            list.insert(1);
            list.insert_at(0, 7);
            assert_eq!(list.iter().copied().collect::<Vec<_>>(), vec![7, 3, 1]);
            assert_eq!(list.remove_at(5), None);
            assert_eq!(list.pop_front(), Some(7));
        }

        #[test]
        fn set_comparator_resorts() {
            let mut list = OrderedList::new();
            list.insert((5, 'x'));
            list.insert((0, 'y'));
            list.set_comparator(by_key);
            assert_eq!(list.first(), Some(&(0, 'y')));
        }
    }
}
