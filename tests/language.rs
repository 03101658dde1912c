//! Loader and language error paths: imports, aliases, typing rules and
//! hierarchy checks.

use std::io;
use std::sync::Arc;

use assert_matches::assert_matches;

use nyan::{Database, NyanError, LATEST_T};

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

fn load_err(files: &[(&str, &str)]) -> NyanError {
    load(files).err().expect("expected load failure")
}

#[test]
fn imports_resolve_across_files() {
    let db = load(&[
        (
            "game.nyan",
            "import units\nKnight(units.Unit):\n    hp += 5\n",
        ),
        ("units.nyan", "Unit():\n    hp : int = 10\n"),
    ])
    .expect("load");
    let view = db.new_view();
    assert_eq!(
        view.get_object("game.Knight")
            .unwrap()
            .get_int("hp", LATEST_T)
            .unwrap(),
        15
    );
}

#[test]
fn aliased_imports_expand() {
    let db = load(&[
        (
            "game.nyan",
            "import data.units as u\nKnight(u.Unit):\n    pass\n",
        ),
        ("data/units.nyan", "Unit():\n    hp : int = 10\n"),
    ])
    .expect("load");
    let view = db.new_view();
    assert_eq!(
        view.get_object("game.Knight")
            .unwrap()
            .get_int("hp", LATEST_T)
            .unwrap(),
        10
    );
}

#[test]
fn nested_objects_concatenate_namespaces() {
    let db = load(&[(
        "root.nyan",
        "Outer():\n    Inner():\n        x : int = 1\n    y : int = 2\n",
    )])
    .expect("load");
    let view = db.new_view();
    assert_eq!(
        view.get_object("root.Outer.Inner")
            .unwrap()
            .get_int("x", LATEST_T)
            .unwrap(),
        1
    );
    // siblings resolve through the containing namespace
    assert!(view.get_object("root.Outer").is_ok());
}

#[test]
fn missing_import_is_a_file_read_error() {
    let err = load_err(&[("root.nyan", "import nowhere\nA():\n    pass\n")]);
    assert_matches!(err, NyanError::FileRead(_));
}

#[test]
fn unknown_parent_is_a_name_error() {
    let err = load_err(&[("root.nyan", "A(Ghost):\n    pass\n")]);
    assert_matches!(err, NyanError::Name(_));
}

#[test]
fn object_name_conflicting_with_alias_is_rejected() {
    let err = load_err(&[
        ("root.nyan", "import other as X\nX():\n    pass\n"),
        ("other.nyan", "B():\n    pass\n"),
    ]);
    assert_matches!(err, NyanError::Name(_));
}

#[test]
fn duplicate_alias_is_rejected() {
    let err = load_err(&[
        ("root.nyan", "import a as x\nimport b as x\nA():\n    pass\n"),
        ("a.nyan", "A():\n    pass\n"),
        ("b.nyan", "B():\n    pass\n"),
    ]);
    assert_matches!(err, NyanError::Name(_));
}

#[test]
fn duplicate_object_definition_is_rejected() {
    let err = load_err(&[("root.nyan", "A():\n    pass\nA():\n    pass\n")]);
    assert_matches!(err, NyanError::Name(_));
}

#[test]
fn inheritance_cycles_are_detected() {
    let err = load_err(&[("root.nyan", "A(B):\n    pass\nB(A):\n    pass\n")]);
    assert_matches!(err, NyanError::C3(_));
}

#[test]
fn unmergeable_hierarchies_are_detected() {
    let err = load_err(&[(
        "root.nyan",
        "X():\n    pass\nY():\n    pass\n\
         XY(X, Y):\n    pass\nYX(Y, X):\n    pass\n\
         Z(XY, YX):\n    pass\n",
    )]);
    assert_matches!(err, NyanError::C3(_));
}

#[test]
fn relative_operator_without_assignment_is_rejected() {
    let err = load_err(&[("root.nyan", "A():\n    x : int += 1\n")]);
    assert_matches!(err, NyanError::Lang(_));
}

#[test]
fn inheritance_edits_require_a_patch() {
    let err = load_err(&[(
        "root.nyan",
        "P():\n    pass\nA[+P]():\n    pass\n",
    )]);
    assert_matches!(err, NyanError::Lang(_));
}

#[test]
fn child_patches_cannot_redeclare_a_target() {
    let err = load_err(&[(
        "root.nyan",
        "A():\n    x : int = 1\nB():\n    y : int = 2\n\
         P1<A>():\n    x = 3\nP2<B>(P1):\n    y = 4\n",
    )]);
    assert_matches!(err, NyanError::Lang(_));
}

#[test]
fn inherited_patches_stay_patches() {
    let db = load(&[(
        "root.nyan",
        "A():\n    x : int = 1\nP1<A>():\n    x = 3\nP2(P1):\n    x = 4\n",
    )])
    .expect("load");
    let view = db.new_view();
    let child_patch = view.get_object("root.P2").unwrap();
    assert!(child_patch.is_patch());
    assert_eq!(child_patch.target().as_deref(), Some("root.A"));

    let mut tx = view.new_transaction(1);
    assert!(tx.add(&child_patch));
    assert!(tx.commit());
    // the patch linearization applies P2 and then P1
    assert_eq!(view.get_object("root.A").unwrap().get_int("x", 1).unwrap(), 3);
}

#[test]
fn member_types_resolve_through_patch_targets() {
    let db = load(&[(
        "root.nyan",
        "A():\n    x : int = 1\nP<A>():\n    x = 5\n",
    )])
    .expect("load");
    // the patch member x borrowed its type from A.x
    let info = db.info().object("root.P").expect("patch info");
    let member = info.member("x").expect("member info");
    assert!(!member.is_initial_def());
    assert!(member.member_type().is_some());
}

#[test]
fn untypable_members_are_rejected() {
    let err = load_err(&[("root.nyan", "A():\n    pass\nB(A):\n    z += 1\n")]);
    assert_matches!(err, NyanError::Type(_));
}

#[test]
fn conflicting_initial_type_definitions_are_rejected() {
    let err = load_err(&[(
        "root.nyan",
        "A():\n    x : int = 1\nB():\n    x : int = 2\nC(A, B):\n    x += 1\n",
    )]);
    assert_matches!(err, NyanError::Lang(_));
}

#[test]
fn redeclared_member_types_in_children_are_rejected() {
    let err = load_err(&[(
        "root.nyan",
        "A():\n    x : int = 1\nB(A):\n    x : int = 2\n",
    )]);
    assert_matches!(err, NyanError::Lang(_));
}

#[test]
fn operator_type_mismatches_are_rejected() {
    // text members don't subtract
    let err = load_err(&[("root.nyan", "A():\n    t : text = \"a\"\nB(A):\n    t -= \"a\"\n")]);
    assert_matches!(err, NyanError::Type(_));
}

#[test]
fn assigning_none_to_non_optional_members_is_rejected() {
    let err = load_err(&[("root.nyan", "A():\n    x : int = None\n")]);
    assert_matches!(err, NyanError::Type(_));
}

#[test]
fn children_modifier_rejects_the_base_object_itself() {
    let err = load_err(&[(
        "root.nyan",
        "P():\n    pass\nC(P):\n    pass\nH():\n    r : children(P) = P\n",
    )]);
    assert_matches!(err, NyanError::Type(_));

    let db = load(&[(
        "root.nyan",
        "P():\n    pass\nC(P):\n    pass\nH():\n    r : children(P) = C\n",
    )])
    .expect("children accepts strict descendants");
    let view = db.new_view();
    assert_eq!(
        view.get_object("root.H")
            .unwrap()
            .get_object("r", LATEST_T)
            .unwrap()
            .name(),
        "root.C"
    );
}

#[test]
fn unrelated_objects_are_rejected_as_values() {
    let err = load_err(&[(
        "root.nyan",
        "P():\n    pass\nQ():\n    pass\nH():\n    r : P = Q\n",
    )]);
    assert_matches!(err, NyanError::Type(_));
}

#[test]
fn abstract_objects_cannot_be_values_without_the_modifier() {
    // Abs declares a member that is never assigned anywhere
    let err = load_err(&[(
        "root.nyan",
        "Abs():\n    m : int\nH():\n    r : Abs = Abs\n",
    )]);
    assert_matches!(err, NyanError::Type(_));

    // with abstract(...) the same value is fine
    let db = load(&[(
        "root.nyan",
        "Abs():\n    m : int\nH():\n    r : abstract(Abs) = Abs\n",
    )])
    .expect("abstract positions accept abstract objects");
    assert!(db.info().has_object("root.H"));
}

#[test]
fn concrete_descendants_of_abstract_objects_are_accepted() {
    let db = load(&[(
        "root.nyan",
        "Abs():\n    m : int\nImpl(Abs):\n    m = 3\nH():\n    r : Abs = Impl\n",
    )])
    .expect("load");
    let view = db.new_view();
    let r = view
        .get_object("root.H")
        .unwrap()
        .get_object("r", LATEST_T)
        .unwrap();
    assert_eq!(r.get_int("m", LATEST_T).unwrap(), 3);
}

#[test]
fn override_depth_is_bounds_checked() {
    // A is no patch: any @ on its members exceeds the (empty) chain
    let err = load_err(&[("root.nyan", "A():\n    x : int @= 1\n")]);
    assert_matches!(err, NyanError::Lang(_));

    // a single @ inside a patch of depth one is stored and accepted
    let db = load(&[(
        "root.nyan",
        "A():\n    x : int = 1\nP<A>():\n    x @= 5\n",
    )])
    .expect("load");
    assert!(db.info().has_object("root.P"));
}

#[test]
fn set_literals_must_match_the_container_kind() {
    let err = load_err(&[(
        "root.nyan",
        "A():\n    s : set(int) = o{1, 2}\n",
    )]);
    assert_matches!(err, NyanError::Type(_));

    // the empty literal fills any container kind
    let db = load(&[(
        "root.nyan",
        "A():\n    s : orderedset(int) = {}\n",
    )])
    .expect("load");
    assert!(db.info().has_object("root.A"));
}

#[test]
fn version_arguments_are_accepted() {
    let db = load(&[("root.nyan", "!version 2\nA():\n    x : int = 1\n")]).expect("load");
    assert!(db.info().has_object("root.A"));
}
