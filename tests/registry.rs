use natter::{Error, Registry, Sweep};

fn registry_of(n: usize) -> Registry<String> {
    let mut registry = Registry::new();
    for id in 0..n {
        registry
            .insert(id, format!("member-{id}"))
            .expect("Failed to insert");
    }
    registry
}

#[test]
fn insert_preserves_traversal_order() {
    let registry = registry_of(5);
    assert_eq!(registry.len(), 5);
    assert_eq!(registry.ids(), vec![0, 1, 2, 3, 4]);
}

#[test]
fn sweep_removing_every_member_visits_each_exactly_once() {
    let n = 10;
    let mut registry = registry_of(n);

    let mut visited = Vec::new();
    registry.sweep(|id, _| {
        visited.push(id);
        Sweep::Remove
    });

    assert_eq!(visited.len(), n);
    assert_eq!(visited, (0..n).collect::<Vec<_>>());
    assert!(registry.is_empty());
}

#[test]
fn sweep_removing_some_members_keeps_the_rest_in_order() {
    let mut registry = registry_of(6);

    registry.sweep(|id, _| {
        if id % 2 == 0 {
            Sweep::Remove
        } else {
            Sweep::Keep
        }
    });

    assert_eq!(registry.len(), 3);
    assert_eq!(registry.ids(), vec![1, 3, 5]);
}

#[test]
fn removal_of_arbitrary_members_mid_pass_via_id_snapshot() {
    // The id snapshot stays valid no matter which members are removed while
    // walking it; absent ids show up as a clean not-found.
    let mut registry = registry_of(6);

    let mut visits = 0;
    for id in registry.ids() {
        if !registry.contains(id) {
            continue;
        }
        visits += 1;
        // Remove the visited member and its successor.
        registry.remove(id).expect("Visited member should be present");
        let _ = registry.remove(id + 1);
    }

    assert_eq!(visits, 3); // 0, 2 and 4; 1, 3 and 5 were removed as successors
    assert!(registry.is_empty());
}

#[test]
fn remove_missing_member_fails_cleanly_and_changes_nothing() {
    let mut registry = registry_of(4);
    let ids_before = registry.ids();

    let result = registry.remove(99);
    assert!(matches!(result, Err(Error::ConnectionNotFound { id: 99 })));

    assert_eq!(registry.len(), 4);
    assert_eq!(registry.ids(), ids_before);
}

#[test]
fn remove_returns_the_payload() {
    let mut registry = registry_of(3);

    let payload = registry.remove(1).expect("Failed to remove");
    assert_eq!(payload, "member-1");
    assert!(!registry.contains(1));
    assert_eq!(registry.ids(), vec![0, 2]);
}

#[test]
fn remove_at_is_positional() {
    let mut registry = registry_of(3);

    let (id, payload) = registry.remove_at(1).expect("Failed to remove at index");
    assert_eq!(id, 1);
    assert_eq!(payload, "member-1");
    assert_eq!(registry.ids(), vec![0, 2]);
}

#[test]
fn remove_at_past_the_end_fails() {
    let mut registry = registry_of(2);

    let result = registry.remove_at(2);
    assert!(matches!(
        result,
        Err(Error::IndexOutOfBounds { index: 2, len: 2 })
    ));
    assert_eq!(registry.len(), 2);
}

#[test]
fn clear_removes_every_member() {
    let mut registry = registry_of(5);
    registry.clear();
    assert!(registry.is_empty());
    assert_eq!(registry.len(), 0);

    // Reusable after clear
    registry.insert(42, "again".to_string()).expect("Failed to insert");
    assert_eq!(registry.ids(), vec![42]);
}

#[test]
fn get_and_get_mut_find_members_by_identity() {
    let mut registry = registry_of(3);

    assert_eq!(registry.get(2).map(String::as_str), Some("member-2"));
    assert!(registry.get(7).is_none());

    if let Some(value) = registry.get_mut(0) {
        value.push_str("-touched");
    }
    assert_eq!(registry.get(0).map(String::as_str), Some("member-0-touched"));
}
