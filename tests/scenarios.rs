//! End-to-end scenarios: loading, value folding, patches, views and
//! notifications.

use std::cell::RefCell;
use std::io;
use std::rc::Rc;
use std::sync::Arc;

use assert_matches::assert_matches;

use nyan::value::Value;
use nyan::{Database, NyanError, Order, LATEST_T};

/// Load a database from in-memory files; the first entry is the root.
fn load(files: &[(&str, &str)]) -> nyan::Result<Arc<Database>> {
    let owned: Vec<(String, String)> = files
        .iter()
        .map(|(name, content)| ((*name).to_owned(), (*content).to_owned()))
        .collect();
    let mut fetcher = move |name: &str| -> io::Result<String> {
        owned
            .iter()
            .find(|(file, _)| file == name)
            .map(|(_, content)| content.clone())
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("no file {}", name)))
    };
    Database::load(files[0].0, &mut fetcher)
}

fn load_root(content: &str) -> Arc<Database> {
    load(&[("root.nyan", content)]).expect("load failed")
}

#[test]
fn single_object_primitive_member() {
    let db = load_root("A():\n    x : int = 3\n");
    let view = db.new_view();
    let a = view.get_object("root.A").expect("object");
    assert_eq!(a.get_int("x", LATEST_T).expect("value"), 3);
}

#[test]
fn inheritance_with_operator_fold() {
    let db = load_root(
        "A():\n    x : int = 3\nB(A):\n    x += 2\nC(B):\n    x *= 4\n",
    );
    let view = db.new_view();
    assert_eq!(view.get_object("root.A").unwrap().get_int("x", LATEST_T).unwrap(), 3);
    assert_eq!(view.get_object("root.B").unwrap().get_int("x", LATEST_T).unwrap(), 5);
    assert_eq!(view.get_object("root.C").unwrap().get_int("x", LATEST_T).unwrap(), 20);
}

#[test]
fn c3_diamond() {
    let db = load_root(
        "Top():\n    v : int = 1\n\
         Left(Top):\n    v += 1\n\
         Right(Top):\n    v += 10\n\
         Bottom(Left, Right):\n    pass\n",
    );
    let view = db.new_view();
    let bottom = view.get_object("root.Bottom").unwrap();

    let lin = bottom.linearized(LATEST_T).unwrap();
    let lin: Vec<&str> = lin.iter().map(String::as_str).collect();
    assert_eq!(lin, vec!["root.Bottom", "root.Left", "root.Right", "root.Top"]);

    assert_eq!(bottom.get_int("v", LATEST_T).unwrap(), 12);
}

#[test]
fn patch_with_assignment() {
    let db = load_root("A():\n    x : int = 3\nAP<A>():\n    x = 99\n");
    let view = db.new_view();

    let patch = view.get_object("root.AP").unwrap();
    assert!(patch.is_patch());
    assert_eq!(patch.target().as_deref(), Some("root.A"));

    let mut tx = view.new_transaction(1);
    assert!(tx.add(&patch));
    assert!(tx.commit());

    let a = view.get_object("root.A").unwrap();
    assert_eq!(a.get_int("x", 1).unwrap(), 99);
    assert_eq!(a.get_int("x", 0).unwrap(), 3);
    assert_eq!(a.get_int("x", LATEST_T).unwrap(), 99);
}

#[test]
fn patch_that_adds_a_parent() {
    let db = load_root(
        "P():\n    y : int = 7\n\
         A():\n    x : int = 1\n\
         AP<A>[+P]():\n    pass\n",
    );
    let view = db.new_view();
    let a = view.get_object("root.A").unwrap();

    assert!(!a.has_member("y", 0).unwrap());

    let patch = view.get_object("root.AP").unwrap();
    let mut tx = view.new_transaction(1);
    assert!(tx.add(&patch));
    assert!(tx.commit());

    assert!(a.has_member("y", 1).unwrap());
    assert_eq!(a.get_int("y", 1).unwrap(), 7);
    assert!(a.linearized(1).unwrap().contains(&"root.P".to_owned()));
    assert!(a.extends("root.P", 1).unwrap());
    // the past is untouched
    assert!(!a.has_member("y", 0).unwrap());
}

#[test]
fn orderedset_order_preservation() {
    let db = load_root(
        "A():\n    s : orderedset(int) = o{1, 2, 3}\nB(A):\n    s += o{4, 2}\n",
    );
    let view = db.new_view();
    let b = view.get_object("root.B").unwrap();
    let values = b.get_orderedset("s", LATEST_T).unwrap();
    let order: Vec<Value> = values.iter().cloned().collect();
    assert_eq!(
        order,
        vec![Value::Int(1), Value::Int(2), Value::Int(3), Value::Int(4)]
    );
}

#[test]
fn infinity_error_aborts_the_transaction() {
    let db = load_root("A():\n    x : float = inf\nAP<A>():\n    x -= inf\n");
    let view = db.new_view();

    let patch = view.get_object("root.AP").unwrap();
    let mut tx = view.new_transaction(1);
    // the undefined infinity operation invalidates the transaction
    assert!(!tx.add(&patch));
    assert!(!tx.commit());
    assert_matches!(tx.error(), Some(NyanError::Value(_)));

    let a = view.get_object("root.A").unwrap();
    assert_eq!(a.get_float("x", 1).unwrap(), f64::INFINITY);
}

#[test]
fn finite_plus_infinity_through_a_patch() {
    let db = load_root("A():\n    x : float = 5.0\nAP<A>():\n    x += inf\n");
    let view = db.new_view();
    let mut tx = view.new_transaction(1);
    assert!(tx.add(&view.get_object("root.AP").unwrap()));
    assert!(tx.commit());
    assert_eq!(
        view.get_object("root.A").unwrap().get_float("x", 1).unwrap(),
        f64::INFINITY
    );
}

#[test]
fn reading_is_pure() {
    let db = load_root("A():\n    x : int = 3\nB(A):\n    x += 2\n");
    let view = db.new_view();
    let b = view.get_object("root.B").unwrap();
    assert_eq!(
        b.get_int("x", LATEST_T).unwrap(),
        b.get_int("x", LATEST_T).unwrap()
    );
}

#[test]
fn patch_members_without_assignment_only_fail_on_read() {
    // AP.x has no `=` anywhere in AP's own linearization; reading it on
    // the patch is a member lookup failure, reading it on A works
    let db = load_root("A():\n    x : int = 3\nAP<A>():\n    x += 2\n");
    let view = db.new_view();
    let patch = view.get_object("root.AP").unwrap();
    assert_matches!(
        patch.get_int("x", LATEST_T),
        Err(NyanError::MemberNotFound { .. })
    );
    assert!(patch.has_member("x", LATEST_T).unwrap());
}

#[test]
fn assign_patches_are_idempotent_relative_patches_accumulate() {
    let db = load_root(
        "A():\n    x : int = 3\n    y : int = 10\n\
         AP<A>():\n    x = 99\n    y += 1\n",
    );
    let view = db.new_view();
    let patch = view.get_object("root.AP").unwrap();

    let mut tx = view.new_transaction(1);
    assert!(tx.add(&patch));
    assert!(tx.add(&patch));
    assert!(tx.commit());

    let a = view.get_object("root.A").unwrap();
    assert_eq!(a.get_int("x", 1).unwrap(), 99);
    assert_eq!(a.get_int("y", 1).unwrap(), 12);
}

#[test]
fn later_history_is_truncated_by_earlier_commits() {
    let db = load_root(
        "A():\n    x : int = 0\n\
         P1<A>():\n    x = 10\n\
         P2<A>():\n    x = 20\n\
         P3<A>():\n    x = 30\n",
    );
    let view = db.new_view();
    let a = view.get_object("root.A").unwrap();

    let mut tx = view.new_transaction(1);
    assert!(tx.add(&view.get_object("root.P1").unwrap()));
    assert!(tx.commit());
    let mut tx = view.new_transaction(5);
    assert!(tx.add(&view.get_object("root.P2").unwrap()));
    assert!(tx.commit());
    assert_eq!(a.get_int("x", 5).unwrap(), 20);

    // committing at t=3 drops everything from t=3 on, including t=5
    let mut tx = view.new_transaction(3);
    assert!(tx.add(&view.get_object("root.P3").unwrap()));
    assert!(tx.commit());

    assert_eq!(a.get_int("x", 1).unwrap(), 10);
    assert_eq!(a.get_int("x", 3).unwrap(), 30);
    assert_eq!(a.get_int("x", 5).unwrap(), 30);
    assert_eq!(a.get_int("x", LATEST_T).unwrap(), 30);
}

#[test]
fn repeated_transactions_at_the_same_time_merge() {
    let db = load_root(
        "A():\n    x : int = 1\n\
         B():\n    y : int = 2\n\
         AP<A>():\n    x = 11\n\
         BP<B>():\n    y = 22\n",
    );
    let view = db.new_view();

    let mut tx = view.new_transaction(4);
    assert!(tx.add(&view.get_object("root.AP").unwrap()));
    assert!(tx.commit());

    let mut tx = view.new_transaction(4);
    assert!(tx.add(&view.get_object("root.BP").unwrap()));
    assert!(tx.commit());

    // both changes are visible in the merged state at t=4
    assert_eq!(view.get_object("root.A").unwrap().get_int("x", 4).unwrap(), 11);
    assert_eq!(view.get_object("root.B").unwrap().get_int("y", 4).unwrap(), 22);
}

#[test]
fn views_evolve_independently() {
    let db = load_root("A():\n    x : int = 3\nAP<A>():\n    x = 99\n");
    let first = db.new_view();
    let second = db.new_view();

    let mut tx = first.new_transaction(1);
    assert!(tx.add(&first.get_object("root.AP").unwrap()));
    assert!(tx.commit());

    assert_eq!(first.get_object("root.A").unwrap().get_int("x", 1).unwrap(), 99);
    assert_eq!(second.get_object("root.A").unwrap().get_int("x", 1).unwrap(), 3);
}

#[test]
fn transactions_propagate_into_child_views() {
    let db = load_root("A():\n    x : int = 3\nAP<A>():\n    x = 99\n");
    let parent = db.new_view();
    let child = parent.new_child();

    let mut tx = parent.new_transaction(1);
    assert!(tx.add(&parent.get_object("root.AP").unwrap()));
    assert!(tx.commit());

    assert_eq!(child.get_object("root.A").unwrap().get_int("x", 1).unwrap(), 99);
}

#[test]
fn child_views_read_through_to_their_parent() {
    let db = load_root(
        "A():\n    x : int = 3\nAP<A>():\n    x = 99\nCP<A>():\n    x = 7\n",
    );
    let parent = db.new_view();

    let mut tx = parent.new_transaction(1);
    assert!(tx.add(&parent.get_object("root.AP").unwrap()));
    assert!(tx.commit());

    // created after the commit, the child still sees the parent's state
    let child = parent.new_child();
    assert_eq!(child.get_object("root.A").unwrap().get_int("x", 1).unwrap(), 99);

    // the child's own changes stay invisible to the parent
    let mut tx = child.new_transaction(2);
    assert!(tx.add(&child.get_object("root.CP").unwrap()));
    assert!(tx.commit());

    assert_eq!(child.get_object("root.A").unwrap().get_int("x", 2).unwrap(), 7);
    assert_eq!(parent.get_object("root.A").unwrap().get_int("x", 2).unwrap(), 99);
}

#[test]
fn committed_inheritance_edits_open_members_for_later_patches() {
    // once the new parent is committed and relinearized, a later
    // transaction can override the newly reachable member
    let db = load_root(
        "P():\n    y : int = 7\n\
         A():\n    x : int = 1\n\
         AP<A>[+P]():\n    pass\n\
         YP<A>():\n    y : int = 70\n",
    );
    let view = db.new_view();

    let mut tx = view.new_transaction(1);
    assert!(tx.add(&view.get_object("root.AP").unwrap()));
    assert!(tx.commit());
    assert_eq!(view.get_object("root.A").unwrap().get_int("y", 1).unwrap(), 7);

    let mut tx = view.new_transaction(2);
    assert!(tx.add(&view.get_object("root.YP").unwrap()));
    assert!(tx.commit());
    assert_eq!(view.get_object("root.A").unwrap().get_int("y", 2).unwrap(), 70);
    assert_eq!(view.get_object("root.A").unwrap().get_int("y", 1).unwrap(), 7);
}

#[test]
fn notifiers_fire_for_objects_and_descendants() {
    let db = load_root(
        "A():\n    x : int = 3\nB(A):\n    pass\nAP<A>():\n    x = 99\n",
    );
    let view = db.new_view();

    let calls: Rc<RefCell<Vec<(Order, String)>>> = Rc::new(RefCell::new(Vec::new()));

    let record = Rc::clone(&calls);
    let _handle_a = view
        .get_object("root.A")
        .unwrap()
        .subscribe(move |t, fqon, _state| {
            record.borrow_mut().push((t, fqon.clone()));
        });

    let record = Rc::clone(&calls);
    let _handle_b = view
        .get_object("root.B")
        .unwrap()
        .subscribe(move |t, fqon, _state| {
            record.borrow_mut().push((t, fqon.clone()));
        });

    let mut tx = view.new_transaction(1);
    assert!(tx.add(&view.get_object("root.AP").unwrap()));
    assert!(tx.commit());

    let mut fired = calls.borrow().clone();
    fired.sort();
    assert_eq!(
        fired,
        vec![(1, "root.A".to_owned()), (1, "root.B".to_owned())]
    );
}

#[test]
fn dropping_the_notifier_handle_deregisters() {
    let db = load_root("A():\n    x : int = 3\nAP<A>():\n    x = 99\n");
    let view = db.new_view();

    let calls: Rc<RefCell<usize>> = Rc::new(RefCell::new(0));
    let record = Rc::clone(&calls);
    let handle = view
        .get_object("root.A")
        .unwrap()
        .subscribe(move |_, _, _| {
            *record.borrow_mut() += 1;
        });

    let mut tx = view.new_transaction(1);
    assert!(tx.add(&view.get_object("root.AP").unwrap()));
    assert!(tx.commit());
    assert_eq!(*calls.borrow(), 1);

    drop(handle);

    let mut tx = view.new_transaction(2);
    assert!(tx.add(&view.get_object("root.AP").unwrap()));
    assert!(tx.commit());
    assert_eq!(*calls.borrow(), 1);
}

#[test]
fn object_references_traverse_the_view() {
    let db = load_root(
        "Animal():\n    legs : int = 4\n\
         Dog(Animal):\n    pass\n\
         Owner():\n    pet : Animal = Dog\n",
    );
    let view = db.new_view();
    let owner = view.get_object("root.Owner").unwrap();
    let pet = owner.get_object("pet", LATEST_T).unwrap();
    assert_eq!(pet.name(), "root.Dog");
    assert_eq!(pet.get_int("legs", LATEST_T).unwrap(), 4);
}

#[test]
fn text_and_bool_and_dict_members() {
    let db = load_root(
        "A():\n    name : text = \"cat\"\n    tame : bool = False\n    d : dict(text, int) = {\"a\": 1}\n\
         B(A):\n    name += \"fish\"\n    tame |= True\n    d += {\"b\": 2}\n",
    );
    let view = db.new_view();
    let b = view.get_object("root.B").unwrap();
    assert_eq!(b.get_text("name", LATEST_T).unwrap(), "catfish");
    assert!(b.get_bool("tame", LATEST_T).unwrap());

    let dict = b.get_dict("d", LATEST_T).unwrap();
    assert_eq!(dict.len(), 2);
    assert_eq!(
        dict.get(&Value::Text("b".into())),
        Some(&Value::Int(2))
    );
}

#[test]
fn optional_members_hold_none() {
    let db = load_root(
        "A():\n    x : optional(int) = None\n    y : optional(int) = 5\n\
         NP<A>():\n    y = None\n",
    );
    let view = db.new_view();
    let a = view.get_object("root.A").unwrap();
    assert_eq!(a.get_optional::<i64>("x", 0).unwrap(), None);
    assert_eq!(a.get_optional::<i64>("y", 0).unwrap(), Some(5));

    let mut tx = view.new_transaction(1);
    assert!(tx.add(&view.get_object("root.NP").unwrap()));
    assert!(tx.commit());
    assert_eq!(a.get_optional::<i64>("y", 1).unwrap(), None);
}

#[test]
fn wrong_typed_reads_are_rejected() {
    let db = load_root("A():\n    x : int = 3\n");
    let view = db.new_view();
    let a = view.get_object("root.A").unwrap();
    assert_matches!(
        a.get_text("x", LATEST_T),
        Err(NyanError::MemberType { .. })
    );
    assert_matches!(
        view.get_object("root.Nope"),
        Err(NyanError::ObjectNotFound(_))
    );
    assert_matches!(
        a.get_int("nope", LATEST_T),
        Err(NyanError::MemberNotFound { .. })
    );
}
