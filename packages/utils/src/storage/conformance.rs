//! Shared behavioral tests any `Store<String>` implementation must pass.
use platform_types::{AccountId, Pagination};
use uuid::Uuid;

use super::Store;

pub fn put_get_delete_list<S: Store<String>>(store: S) {
    let account = AccountId::new();
    let id = Uuid::now_v7();

    assert_eq!(store.get(&account, id).unwrap(), None);

    store.put(&account, id, "hello".to_string()).unwrap();
    assert_eq!(store.get(&account, id).unwrap(), Some("hello".to_string()));

    let page = store.list(&account, Pagination::default()).unwrap();
    assert_eq!(page.items, vec!["hello".to_string()]);
    assert_eq!(page.total, 1);

    let removed = store.delete(&account, id).unwrap();
    assert_eq!(removed, Some("hello".to_string()));
    assert_eq!(store.get(&account, id).unwrap(), None);
    assert_eq!(store.delete(&account, id).unwrap(), None);
}

pub fn accounts_are_isolated<S: Store<String>>(store: S) {
    let a = AccountId::new();
    let b = AccountId::new();
    let id = Uuid::now_v7();

    store.put(&a, id, "a-value".to_string()).unwrap();
    assert_eq!(store.get(&b, id).unwrap(), None);

    let page = store.list(&b, Pagination::default()).unwrap();
    assert!(page.items.is_empty());
}

pub fn list_paginates_in_insertion_order<S: Store<String>>(store: S) {
    let account = AccountId::new();
    for i in 0..5 {
        store
            .put(&account, Uuid::now_v7(), format!("item-{i}"))
            .unwrap();
    }

    let page = store
        .list(
            &account,
            Pagination {
                limit: 2,
                offset: 1,
            },
        )
        .unwrap();
    assert_eq!(page.items, vec!["item-1".to_string(), "item-2".to_string()]);
    assert_eq!(page.total, 5);
    assert_eq!(page.limit, 2);
    assert_eq!(page.offset, 1);
}
