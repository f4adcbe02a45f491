//! Representation-specialized lists.
//!
//! A list starts out `Empty` and picks its storage on the first element: a
//! packed `Vec<i64>` for integers, boxed `Value`s for anything else. Storing
//! a non-integer into a packed list migrates it to boxed storage first. The
//! representation only ever widens.

use super::value::Value;
use crate::runtime::runtime_error::PanicKind;

#[derive(Debug, Clone, Default)]
pub enum ListRepr {
    #[default]
    Empty,
    Packed(Vec<i64>),
    Boxed(Vec<Value>),
}

/// Storage tag of a list, ordered by width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Strategy {
    Empty,
    Packed,
    Boxed,
}

#[derive(Debug, Clone, Default)]
pub struct List {
    repr: ListRepr,
}

impl List {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_values(values: impl IntoIterator<Item = Value>) -> Self {
        let mut list = List::new();
        for value in values {
            list.append(value);
        }
        list
    }

    pub fn strategy(&self) -> Strategy {
        match self.repr {
            ListRepr::Empty => Strategy::Empty,
            ListRepr::Packed(_) => Strategy::Packed,
            ListRepr::Boxed(_) => Strategy::Boxed,
        }
    }

    pub fn len(&self) -> usize {
        match &self.repr {
            ListRepr::Empty => 0,
            ListRepr::Packed(items) => items.len(),
            ListRepr::Boxed(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn append(&mut self, value: Value) {
        match &mut self.repr {
            ListRepr::Empty => {
                self.repr = match value {
                    Value::Integer(n) => ListRepr::Packed(vec![n]),
                    other => ListRepr::Boxed(vec![other]),
                }
            }
            ListRepr::Packed(items) => match value {
                Value::Integer(n) => items.push(n),
                other => self.widen().push(other),
            },
            ListRepr::Boxed(items) => items.push(value),
        }
    }

    pub fn get(&self, index: &Value) -> Result<Value, PanicKind> {
        let index = self.check_index(index)?;
        Ok(match &self.repr {
            ListRepr::Empty => unreachable!("index checked against an empty list"),
            ListRepr::Packed(items) => Value::Integer(items[index]),
            ListRepr::Boxed(items) => items[index].clone(),
        })
    }

    pub fn set(&mut self, index: &Value, value: Value) -> Result<(), PanicKind> {
        let index = self.check_index(index)?;
        match &mut self.repr {
            ListRepr::Packed(items) => match value {
                Value::Integer(n) => items[index] = n,
                other => self.widen()[index] = other,
            },
            ListRepr::Boxed(items) => items[index] = value,
            ListRepr::Empty => unreachable!("index checked against an empty list"),
        }
        Ok(())
    }

    pub fn swap(&mut self, left: &Value, right: &Value) -> Result<(), PanicKind> {
        let left = self.check_index(left)?;
        let right = self.check_index(right)?;
        match &mut self.repr {
            ListRepr::Packed(items) => items.swap(left, right),
            ListRepr::Boxed(items) => items.swap(left, right),
            ListRepr::Empty => unreachable!("index checked against an empty list"),
        }
        Ok(())
    }

    /// Snapshot of the elements as boxed values.
    pub fn to_values(&self) -> Vec<Value> {
        match &self.repr {
            ListRepr::Empty => Vec::new(),
            ListRepr::Packed(items) => items.iter().copied().map(Value::Integer).collect(),
            ListRepr::Boxed(items) => items.clone(),
        }
    }

    fn check_index(&self, index: &Value) -> Result<usize, PanicKind> {
        let Value::Integer(raw) = index else {
            return Err(PanicKind::BadIndex {
                type_name: index.type_name(),
            });
        };
        let len = self.len();
        usize::try_from(*raw)
            .ok()
            .filter(|i| *i < len)
            .ok_or(PanicKind::IndexOutOfBounds { index: *raw, len })
    }

    /// Move packed integers into boxed storage and hand it back.
    fn widen(&mut self) -> &mut Vec<Value> {
        if let ListRepr::Packed(items) = &mut self.repr {
            let boxed = std::mem::take(items)
                .into_iter()
                .map(Value::Integer)
                .collect();
            self.repr = ListRepr::Boxed(boxed);
        }
        match &mut self.repr {
            ListRepr::Boxed(items) => items,
            _ => unreachable!("widen only runs on non-empty lists"),
        }
    }
}

impl PartialEq for List {
    /// Element-wise; the storage strategy does not take part.
    fn eq(&self, other: &Self) -> bool {
        content_eq(self, other, &mut Vec::new())
    }
}

/// Pairs in `open` are already being compared further up; treating them as
/// equal lets lists that contain themselves compare without looping.
fn content_eq(a: &List, b: &List, open: &mut Vec<(*const List, *const List)>) -> bool {
    match (&a.repr, &b.repr) {
        (ListRepr::Packed(x), ListRepr::Packed(y)) => return x == y,
        _ if a.len() != b.len() => return false,
        _ => {}
    }
    let pair = (a as *const List, b as *const List);
    if open.contains(&pair) {
        return true;
    }

    open.push(pair);
    let equal = a
        .to_values()
        .iter()
        .zip(b.to_values().iter())
        .all(|(x, y)| match (x, y) {
            (Value::List(x), Value::List(y)) => {
                std::ptr::eq(x.as_ptr(), y.as_ptr()) || content_eq(&x.borrow(), &y.borrow(), open)
            }
            _ => x == y,
        });
    open.pop();
    equal
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::{ProptestConfig, any, prop, prop_assert, prop_assert_eq, prop_oneof, proptest};
    use proptest::strategy::Strategy as Gen;

    fn int(n: i64) -> Value {
        Value::Integer(n)
    }

    fn text(s: &str) -> Value {
        Value::string(s)
    }

    #[test]
    fn test_new_list_is_empty() {
        let list = List::new();
        assert_eq!(list.strategy(), Strategy::Empty);
        assert!(list.is_empty());
    }

    #[test]
    fn test_first_integer_packs() {
        let list = List::from_values([int(1), int(2), int(3)]);
        assert_eq!(list.strategy(), Strategy::Packed);
        assert_eq!(list.len(), 3);
    }

    #[test]
    fn test_first_string_boxes() {
        let list = List::from_values([text("a")]);
        assert_eq!(list.strategy(), Strategy::Boxed);
    }

    #[test]
    fn test_append_string_widens_packed() {
        let mut list = List::from_values([int(1), int(2)]);
        list.append(text("x"));

        assert_eq!(list.strategy(), Strategy::Boxed);
        assert_eq!(list.to_values(), vec![int(1), int(2), text("x")]);
    }

    #[test]
    fn test_set_string_widens_packed() {
        let mut list = List::from_values([int(1), int(2), int(3)]);
        list.set(&int(1), text("x")).unwrap();

        assert_eq!(list.strategy(), Strategy::Boxed);
        assert_eq!(list.to_values(), vec![int(1), text("x"), int(3)]);
    }

    #[test]
    fn test_boxed_stays_boxed_with_integers() {
        let mut list = List::from_values([text("x")]);
        list.set(&int(0), int(5)).unwrap();
        list.append(int(6));

        assert_eq!(list.strategy(), Strategy::Boxed);
        assert_eq!(list.get(&int(0)).unwrap(), int(5));
    }

    #[test]
    fn test_get_out_of_bounds() {
        let list = List::from_values([int(1)]);
        assert_eq!(
            list.get(&int(1)),
            Err(PanicKind::IndexOutOfBounds { index: 1, len: 1 })
        );
        assert_eq!(
            list.get(&int(-1)),
            Err(PanicKind::IndexOutOfBounds { index: -1, len: 1 })
        );
    }

    #[test]
    fn test_get_on_empty_list() {
        let list = List::new();
        assert!(matches!(
            list.get(&int(0)),
            Err(PanicKind::IndexOutOfBounds { len: 0, .. })
        ));
    }

    #[test]
    fn test_non_integer_index() {
        let list = List::from_values([int(1)]);
        assert_eq!(
            list.get(&text("0")),
            Err(PanicKind::BadIndex { type_name: "String" })
        );
    }

    #[test]
    fn test_swap() {
        let mut list = List::from_values([int(1), int(2), int(3)]);
        list.swap(&int(0), &int(2)).unwrap();
        assert_eq!(list.to_values(), vec![int(3), int(2), int(1)]);
        assert_eq!(list.strategy(), Strategy::Packed);
    }

    #[test]
    fn test_equality_ignores_strategy() {
        let packed = List::from_values([int(1), int(2)]);
        let mut boxed = List::from_values([text("tmp"), int(2)]);
        boxed.set(&int(0), int(1)).unwrap();

        assert_eq!(boxed.strategy(), Strategy::Boxed);
        assert_eq!(packed, boxed);
    }

    #[derive(Debug, Clone)]
    enum ListOp {
        Append(Value),
        Set(i64, Value),
    }

    fn arb_value() -> impl Gen<Value = Value> {
        prop_oneof![
            3 => (-100i64..100).prop_map(Value::Integer),
            1 => "[a-z]{0,3}".prop_map(|s| Value::string(&s)),
            1 => any::<bool>().prop_map(Value::Bool),
        ]
    }

    fn arb_op() -> impl Gen<Value = ListOp> {
        prop_oneof![
            arb_value().prop_map(ListOp::Append),
            (0i64..8, arb_value()).prop_map(|(i, v)| ListOp::Set(i, v)),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        /// The storage strategy never narrows, whatever is appended or stored.
        #[test]
        fn strategy_only_widens(ops in prop::collection::vec(arb_op(), 0..40)) {
            let mut list = List::new();
            let mut previous = list.strategy();

            for op in ops {
                match op {
                    ListOp::Append(v) => list.append(v),
                    ListOp::Set(i, v) => {
                        let _ = list.set(&Value::Integer(i), v);
                    }
                }
                let current = list.strategy();
                prop_assert!(current >= previous, "{:?} narrowed to {:?}", previous, current);
                previous = current;
            }
        }

        /// Packed storage is only kept while every element is an integer.
        #[test]
        fn packed_holds_only_integers(values in prop::collection::vec(arb_value(), 1..20)) {
            let list = List::from_values(values.clone());
            let all_ints = values.iter().all(|v| matches!(v, Value::Integer(_)));
            prop_assert_eq!(list.strategy() == Strategy::Packed, all_ints);
            prop_assert_eq!(list.to_values(), values);
        }
    }
}
