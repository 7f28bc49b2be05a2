//! Property tests: random operation sequences against a simple model.
//!
//! - `container_matches_model`: after every operation the container holds the
//!   value the model predicts, and the tracker holds exactly the blocks the
//!   live containers need
//! - `wrapper_sizes_add_up`: the wrapper's size is the sum of its live blocks
//!   through allocation, release and copying

use std::alloc::Layout;

use anyalloc::{AllocatorAware, Normal, ObjectAllocation, tracking::Tracking};
use proptest::prelude::*;

#[derive(Clone, Debug, PartialEq)]
enum Value {
    Byte(u8),
    Wide(u64),
    Text(String),
    List(Vec<u32>),
    Unit,
}

impl Value {
    fn block_size(&self) -> usize {
        match self {
            Self::Byte(_) => size_of::<u8>(),
            Self::Wide(_) => size_of::<u64>(),
            Self::Text(_) => size_of::<String>(),
            Self::List(_) => size_of::<Vec<u32>>(),
            Self::Unit => 0,
        }
    }
}

#[derive(Clone, Debug)]
enum Op {
    Emplace(Value),
    Clear,
    CloneIntoSecond,
    TakeIntoSecond,
    AssignFromSecond,
    Swap,
}

fn arb_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<u8>().prop_map(Value::Byte),
        any::<u64>().prop_map(Value::Wide),
        ".{0,12}".prop_map(Value::Text),
        proptest::collection::vec(any::<u32>(), 0..6).prop_map(Value::List),
        Just(Value::Unit),
    ]
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => arb_value().prop_map(Op::Emplace),
        1 => Just(Op::Clear),
        1 => Just(Op::CloneIntoSecond),
        1 => Just(Op::TakeIntoSecond),
        1 => Just(Op::AssignFromSecond),
        1 => Just(Op::Swap),
    ]
}

type Container = ObjectAllocation<Normal, Tracking>;

fn emplace(object: &mut Container, value: Value) {
    match value {
        Value::Byte(value) => {
            object.emplace(value).unwrap();
        }
        Value::Wide(value) => {
            object.emplace(value).unwrap();
        }
        Value::Text(value) => {
            object.emplace(value).unwrap();
        }
        Value::List(value) => {
            object.emplace(value).unwrap();
        }
        Value::Unit => {
            object.emplace(()).unwrap();
        }
    }
}

fn observe(object: &Container) -> Option<Value> {
    if let Some(&value) = object.get::<u8>() {
        Some(Value::Byte(value))
    } else if let Some(&value) = object.get::<u64>() {
        Some(Value::Wide(value))
    } else if let Some(value) = object.get::<String>() {
        Some(Value::Text(value.clone()))
    } else if let Some(value) = object.get::<Vec<u32>>() {
        Some(Value::List(value.clone()))
    } else if object.is::<()>() {
        Some(Value::Unit)
    } else {
        assert!(!object.has_value());
        None
    }
}

fn live_blocks(model: &[&Option<Value>]) -> usize {
    model
        .iter()
        .filter(|&&value| value.as_ref().is_some_and(|value| value.block_size() > 0))
        .count()
}

proptest! {
    #[test]
    fn container_matches_model(ops in proptest::collection::vec(arb_op(), 1..40)) {
        let tracking = Tracking::new();
        let mut first = Container::new_in(tracking.clone());
        let mut second = Container::new_in(tracking.clone());
        let mut first_model: Option<Value> = None;
        let mut second_model: Option<Value> = None;

        for op in ops {
            match op {
                Op::Emplace(value) => {
                    emplace(&mut first, value.clone());
                    first_model = Some(value);
                }
                Op::Clear => {
                    first.clear();
                    first_model = None;
                }
                Op::CloneIntoSecond => {
                    second = first.try_clone().unwrap();
                    second_model = first_model.clone();
                }
                Op::TakeIntoSecond => {
                    second = first.take();
                    second_model = first_model.take();
                }
                Op::AssignFromSecond => {
                    first.assign_from(&mut second).unwrap();
                    first_model = second_model.take();
                }
                Op::Swap => {
                    first.swap(&mut second).unwrap();
                    std::mem::swap(&mut first_model, &mut second_model);
                }
            }

            prop_assert_eq!(observe(&first), first_model.clone());
            prop_assert_eq!(observe(&second), second_model.clone());
            prop_assert_eq!(
                first.reserved(),
                first_model.as_ref().map_or(0, Value::block_size)
            );
            prop_assert_eq!(
                tracking.stats().live_blocks,
                live_blocks(&[&first_model, &second_model])
            );
        }

        drop(first);
        drop(second);
        prop_assert_eq!(tracking.stats().live_blocks, 0);
    }

    #[test]
    fn wrapper_sizes_add_up(
        sizes in proptest::collection::vec(1usize..64, 1..12),
        released in proptest::collection::vec(any::<bool>(), 12),
    ) {
        let tracking = Tracking::new();
        let mut wrapper = AllocatorAware::new_in(tracking.clone());
        for &size in &sizes {
            wrapper.allocate(Layout::from_size_align(size, 8).unwrap()).unwrap();
        }

        let mut expected = 0;
        for (index, &size) in sizes.iter().enumerate() {
            if released[index] {
                wrapper.deallocate(index).unwrap();
            } else {
                expected += size;
            }
        }
        prop_assert_eq!(wrapper.size(), expected);
        prop_assert_eq!(tracking.stats().live_bytes, expected);

        let copy = wrapper.try_clone().unwrap();
        prop_assert_eq!(copy.size(), expected);
        prop_assert_eq!(tracking.stats().live_bytes, 2 * expected);
    }
}
