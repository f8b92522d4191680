//! Integration tests for dense list and card ordering

use std::sync::Arc;

use tempfile::TempDir;
use tripboard_store::db::boards::CreateBoardInput;
use tripboard_store::db::cards::CreateCardInput;
use tripboard_store::db::lists::CreateListInput;
use tripboard_store::db::users::CreateUserInput;
use tripboard_store::ordering::is_dense;
use tripboard_store::{Config, Database, Principal, Services, StorageError};

struct Trip {
    services: Arc<Services>,
    ana: Principal,
    board_id: String,
    _temp: TempDir,
}

fn trip() -> Trip {
    let temp = TempDir::new().unwrap();
    let config = Config {
        storage_dir: temp.path().to_path_buf(),
        pool_size: 4,
        ..Default::default()
    };
    let db = Arc::new(Database::open(&config).unwrap());
    let services = Arc::new(Services::new(db, &config));

    let user = services
        .users
        .create(CreateUserInput {
            id: None,
            username: "ana".into(),
            email: "ana@example.com".into(),
            first_name: String::new(),
            last_name: String::new(),
        })
        .unwrap();
    let ana = Principal::new(user.id);
    let board_id = services
        .boards
        .create(
            &ana,
            CreateBoardInput {
                title: "Andes".into(),
                ..Default::default()
            },
        )
        .unwrap()
        .board
        .id;

    Trip {
        services,
        ana,
        board_id,
        _temp: temp,
    }
}

impl Trip {
    fn list(&self, title: &str) -> String {
        self.services
            .lists
            .create(
                &self.ana,
                &self.board_id,
                CreateListInput {
                    title: title.into(),
                    ..Default::default()
                },
            )
            .unwrap()
            .id
    }

    fn card(&self, list_id: &str, title: &str) -> String {
        self.services
            .cards
            .create(
                &self.ana,
                list_id,
                CreateCardInput {
                    title: title.into(),
                    ..Default::default()
                },
            )
            .unwrap()
            .card
            .id
    }

    fn list_order(&self) -> Vec<(String, i32)> {
        self.services
            .lists
            .list(&self.ana, Some(&self.board_id))
            .unwrap()
            .into_iter()
            .map(|l| (l.title, l.position))
            .collect()
    }

    fn card_order(&self, list_id: &str) -> Vec<(String, i32)> {
        self.services
            .cards
            .list(&self.ana, Some(list_id))
            .unwrap()
            .into_iter()
            .map(|c| (c.card.title, c.card.position))
            .collect()
    }
}

fn named(pairs: &[(&str, i32)]) -> Vec<(String, i32)> {
    pairs.iter().map(|(t, p)| (t.to_string(), *p)).collect()
}

#[test]
fn test_reorder_list_to_front() {
    let t = trip();
    t.list("L0");
    t.list("L1");
    let l2 = t.list("L2");

    let ordered = t.services.lists.reorder(&t.ana, &l2, 0).unwrap();
    assert_eq!(ordered[0].id, l2);
    assert_eq!(t.list_order(), named(&[("L2", 0), ("L0", 1), ("L1", 2)]));
}

#[test]
fn test_reorder_to_current_position_changes_nothing() {
    let t = trip();
    t.list("L0");
    let l1 = t.list("L1");
    t.list("L2");

    let snapshot = |t: &Trip| -> Vec<(String, i32, String)> {
        t.services
            .lists
            .list(&t.ana, Some(&t.board_id))
            .unwrap()
            .into_iter()
            .map(|l| (l.id, l.position, l.updated_at))
            .collect()
    };

    let before = snapshot(&t);
    t.services.lists.reorder(&t.ana, &l1, 1).unwrap();
    assert_eq!(snapshot(&t), before);
}

#[test]
fn test_move_card_between_lists() {
    let t = trip();
    let a = t.list("A");
    let b = t.list("B");
    t.card(&a, "c1");
    let c2 = t.card(&a, "c2");
    t.card(&a, "c3");
    t.card(&b, "c4");

    let moved = t.services.cards.move_card(&t.ana, &c2, &b, 0).unwrap();
    assert_eq!(moved.source_list_id, a);
    assert_eq!(moved.destination_list_id, b);
    assert_eq!(moved.card.card.list_id, b);

    assert_eq!(t.card_order(&a), named(&[("c1", 0), ("c3", 1)]));
    assert_eq!(t.card_order(&b), named(&[("c2", 0), ("c4", 1)]));
}

#[test]
fn test_move_past_end_is_rejected_without_changes() {
    let t = trip();
    let a = t.list("A");
    let b = t.list("B");
    let c1 = t.card(&a, "c1");
    t.card(&b, "c4");

    assert!(matches!(
        t.services.cards.move_card(&t.ana, &c1, &b, 5),
        Err(StorageError::InvalidInput(_))
    ));
    assert_eq!(t.card_order(&a), named(&[("c1", 0)]));
    assert_eq!(t.card_order(&b), named(&[("c4", 0)]));
}

#[test]
fn test_deletes_close_gaps() {
    let t = trip();
    let a = t.list("A");
    t.card(&a, "c1");
    let c2 = t.card(&a, "c2");
    t.card(&a, "c3");

    t.services.cards.delete(&t.ana, &c2).unwrap();
    assert_eq!(t.card_order(&a), named(&[("c1", 0), ("c3", 1)]));

    let l1 = t.list("L1");
    t.list("L2");
    t.services.lists.delete(&t.ana, &l1).unwrap();
    assert_eq!(t.list_order(), named(&[("A", 0), ("L2", 1)]));
}

#[test]
fn test_concurrent_card_traffic_keeps_lists_dense() {
    let t = trip();
    let lists: Vec<String> = (0..3).map(|i| t.list(&format!("L{}", i))).collect();
    let cards: Vec<String> = (0..9)
        .map(|i| t.card(&lists[i % 3], &format!("c{}", i)))
        .collect();

    let handles: Vec<_> = cards
        .iter()
        .enumerate()
        .map(|(i, card_id)| {
            let services = t.services.clone();
            let ana = t.ana.clone();
            let card_id = card_id.clone();
            let lists = lists.clone();
            std::thread::spawn(move || {
                for round in 0..4 {
                    let target = &lists[(i + round) % 3];
                    services.cards.move_card(&ana, &card_id, target, 0).unwrap();
                    services.cards.reorder(&ana, &card_id, 0).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let mut total = 0;
    for list_id in &lists {
        let positions: Vec<i32> = t.card_order(list_id).into_iter().map(|(_, p)| p).collect();
        assert!(is_dense(&positions), "positions {:?}", positions);
        total += positions.len();
    }
    assert_eq!(total, 9);
}
