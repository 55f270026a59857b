//! Assertions over store contents.

use crate::containers::{AttributeContainer, ContainerStore};

/// Asserts the store holds exactly these values for `T`, in insertion order.
pub fn assert_values_in_order<T, F>(store: &ContainerStore, value_of: F, expected: &[&str])
where
    T: AttributeContainer,
    F: Fn(&T) -> String,
{
    let actual: Vec<String> = store
        .get_containers::<T>()
        .iter()
        .map(|c| value_of(&c.read()))
        .collect();
    assert_eq!(
        actual, expected,
        "Unexpected '{}' containers in store",
        T::CONTAINER_TYPE
    );
}

/// Asserts the store holds these values for `T`, ignoring order.
pub fn assert_values_unordered<T, F>(store: &ContainerStore, value_of: F, expected: &[&str])
where
    T: AttributeContainer,
    F: Fn(&T) -> String,
{
    let mut actual: Vec<String> = store
        .get_containers::<T>()
        .iter()
        .map(|c| value_of(&c.read()))
        .collect();
    actual.sort();
    let mut expected: Vec<&str> = expected.to_vec();
    expected.sort_unstable();
    assert_eq!(
        actual, expected,
        "Unexpected '{}' containers in store",
        T::CONTAINER_TYPE
    );
}

/// Asserts the store holds no container of type `T`.
pub fn assert_no_containers<T: AttributeContainer>(store: &ContainerStore) {
    let count = store.container_count::<T>();
    assert_eq!(
        count,
        0,
        "Expected no '{}' containers, found {}",
        T::CONTAINER_TYPE,
        count
    );
}
