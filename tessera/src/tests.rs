use rstest::rstest;
use tempfile::tempdir;
use tessera_dtype::kinds::*;
use tessera_dtype::{FieldDecl, Schema, describe};

use crate::*;

tessera_dtype::schema! {
    struct Point { x: F64, y: F64, z: F64 }
    struct Segment { from: Point, to: Point, label: Str }
    struct Node { id: U32, next: Node }
}

struct Reading;

impl Schema for Reading {
    const NAME: &'static str = "Reading";

    fn fields() -> Vec<FieldDecl> {
        vec![
            FieldDecl::new::<U16>("sensor"),
            FieldDecl::new::<U8n>("level").with_range(-1.0, 1.0),
            FieldDecl::new::<WStr>("note"),
            FieldDecl::new::<Bytes>("raw"),
        ]
    }
}

struct Broken;

impl Schema for Broken {
    const NAME: &'static str = "Broken";

    fn fields() -> Vec<FieldDecl> {
        vec![
            FieldDecl::new::<U8>("ok"),
            FieldDecl::unknown("items", "List<Point>"),
        ]
    }
}

fn point(x: f64, y: f64, z: f64) -> Record {
    Record::new::<Point>()
        .with("x", x)
        .and_then(|p| p.with("y", y))
        .and_then(|p| p.with("z", z))
        .unwrap()
}

fn coordinates(record: &Record) -> (f64, f64, f64) {
    (
        record.get_as("x").unwrap(),
        record.get_as("y").unwrap(),
        record.get_as("z").unwrap(),
    )
}

fn segment(from: Record, to: Record, label: &str) -> Record {
    Record::new::<Segment>()
        .with("from", from)
        .and_then(|s| s.with("to", to))
        .and_then(|s| s.with("label", label))
        .unwrap()
}

#[test]
fn fixed_scale_round_trip() {
    let store = Store::truncate([Scale::new::<Point>(5)]).unwrap();
    assert!(store.is_fixed());
    assert!(store.is_fixed_scale());

    let points = store.layer::<Point>().unwrap();
    assert_eq!(points.len(), 5);
    for i in 0..5u32 {
        let mut row = points.get(i as usize).unwrap();
        row.set("x", f64::from(i)).unwrap();
        row.set("y", f64::from(2 * i)).unwrap();
        row.set("z", f64::from(3 * i)).unwrap();
    }

    let dir = tempdir().unwrap();
    let path = dir.path().join("points.tsr");
    store.save(&path).unwrap();

    let loaded = Store::load(path.to_str().unwrap(), true).unwrap();
    assert!(loaded.is_fixed());
    assert!(!loaded.is_fixed_scale());
    let points = loaded.layer::<Point>().unwrap();
    assert_eq!(points.len(), 5);
    assert_eq!(coordinates(&points.get(3).unwrap()), (3.0, 6.0, 9.0));
    assert!(points.get(5).unwrap_err().is_out_of_bounds());
}

#[rstest]
#[case(vec![Scale::new::<Point>(2), Scale::new::<Point>(0).with_alias("empty")])]
#[case(vec![Scale::new::<Segment>(0)])]
fn truncate_rejects_capacity(#[case] scales: Vec<Scale>) {
    assert!(Store::truncate(scales).unwrap_err().is_capacity());
}

#[cfg(target_pointer_width = "64")]
#[test]
fn truncate_rejects_oversized_layers() {
    let scale = Scale::new::<Point>(u32::MAX as usize + 1);
    assert!(Store::truncate([scale]).unwrap_err().is_capacity());
}

#[test]
fn truncate_rejects_unknown_fields() {
    let scales = [Scale::new::<Point>(1), Scale::new::<Broken>(1)];
    assert!(Store::truncate(scales).unwrap_err().is_schema());
}

#[test]
fn truncate_aliases() {
    let store = Store::truncate([
        Scale::new::<Point>(2).with_alias("start"),
        Scale::new::<Point>(3).with_alias("end"),
    ])
    .unwrap();
    assert_eq!(store.layer_as::<Point>("start").unwrap().len(), 2);
    assert_eq!(store.layer_as::<Point>("end").unwrap().len(), 3);
    assert!(store.layer::<Point>().unwrap_err().is_not_found());

    let duplicated = Store::truncate([
        Scale::new::<Point>(2).with_alias("p"),
        Scale::new::<Point>(3).with_alias("p"),
    ]);
    assert!(duplicated.is_err());
}

#[test]
fn fixed_stores_do_not_grow() {
    let store = Store::truncate([Scale::new::<Point>(1)]).unwrap();
    assert!(store.push(&point(1.0, 2.0, 3.0), None).unwrap_err().is_state());
    assert!(store.layer::<Point>().unwrap().begin_row().unwrap_err().is_state());
    assert!(store.get::<Point>("anything").unwrap_err().is_not_found());
}

#[test]
fn named_lookup() {
    let store = Store::create();
    assert!(!store.is_fixed());
    assert_eq!(store.len(), 1);

    let first = segment(point(0.0, 0.0, 0.0), point(1.0, 1.0, 1.0), "first");
    let second = segment(point(5.0, 5.0, 5.0), point(6.0, 6.0, 6.0), "second");
    store.push(&first, Some("s")).unwrap();
    store.push(&second, Some("s")).unwrap();
    store.push(&second, Some("other")).unwrap();

    let found = store.get::<Segment>("s").unwrap().unwrap();
    assert_eq!(found.get_as::<String>("label").unwrap(), "first");
    assert_eq!(found, first);
    assert_eq!(
        store.get::<Segment>("other").unwrap().unwrap().get_as::<String>("label").unwrap(),
        "second"
    );
    assert!(store.get::<Segment>("missing").unwrap().is_none());

    store.combine().unwrap();
    let found = store.get::<Segment>("s").unwrap().unwrap();
    let from = Record::try_from(found.get("from").unwrap()).unwrap();
    assert_eq!(coordinates(&from), (0.0, 0.0, 0.0));
    assert!(store.get::<Point>("s").unwrap_err().is_mismatched_types());
}

#[test]
fn nested_records_are_pushed_first() {
    let store = Store::create();
    let reference = store
        .push(&segment(point(1.0, 2.0, 3.0), point(4.0, 5.0, 6.0), "s"), None)
        .unwrap();

    let layers = store.layers().unwrap();
    let names: Vec<&str> = layers.iter().map(|l| l.name().as_ref()).collect();
    assert_eq!(names, [NAME_LAYER, "Point", "Segment"]);
    assert_eq!(layers[1].rows(), 2);
    assert_eq!(layers[2].rows(), 1);
    assert_eq!(reference.layer(), 2);
    assert_eq!(reference.row(), 0);

    let resolved = store.resolve::<Segment>(reference).unwrap();
    let to = Record::try_from(resolved.get("to").unwrap()).unwrap();
    assert!(to.is_attached());
    assert_eq!(to.reference().unwrap().row(), 1);
    assert_eq!(coordinates(&to), (4.0, 5.0, 6.0));
}

#[test]
fn references_survive_combine_and_reload() {
    let store = Store::create();
    let original = segment(point(1.0, 2.0, 3.0), point(4.0, 5.0, 6.0), "s");
    let reference = store.push(&original, None).unwrap();

    store.combine().unwrap();
    assert!(store.is_fixed());
    assert_eq!(store.resolve::<Segment>(reference).unwrap(), original);

    let dir = tempdir().unwrap();
    let path = dir.path().join("segments.tsr");
    store.save(&path).unwrap();
    let loaded = Store::open(&path).unwrap();
    let reloaded = loaded.layer::<Segment>().unwrap().get(0).unwrap();
    assert_eq!(reloaded, original);
    assert!(loaded.resolve::<Segment>(reference).unwrap_err().is_state());
}

#[test]
fn attached_records_are_referenced_in_place() {
    let store = Store::create();
    let reference = store.push(&point(7.0, 8.0, 9.0), None).unwrap();
    let attached = store.resolve::<Point>(reference).unwrap();

    let linked = Record::new::<Segment>().with("from", attached).unwrap();
    let segment = store.push(&linked, None).unwrap();
    // only the default `to` is added
    assert_eq!(store.layer::<Point>().unwrap().len(), 2);

    store.combine().unwrap();
    let segment = store.resolve::<Segment>(segment).unwrap();
    let from = Record::try_from(segment.get("from").unwrap()).unwrap();
    assert_eq!(from.reference(), Some(reference));
    let to = Record::try_from(segment.get("to").unwrap()).unwrap();
    assert_eq!(coordinates(&to), (0.0, 0.0, 0.0));
}

#[test]
fn unset_references_push_defaults() {
    let store = Store::create();
    let partial = Record::new::<Segment>().with("label", "only label").unwrap();
    store.push(&partial, Some("s")).unwrap();
    assert_eq!(store.layer::<Point>().unwrap().len(), 2);

    store.combine().unwrap();
    let dir = tempdir().unwrap();
    let path = dir.path().join("partial.tsr");
    store.save(&path).unwrap();

    for store in [store, Store::open(&path).unwrap()] {
        let found = store.get::<Segment>("s").unwrap().unwrap();
        assert_eq!(found.get_as::<String>("label").unwrap(), "only label");
        let to = Record::try_from(found.get("to").unwrap()).unwrap();
        assert!(to.is_attached());
        assert_eq!(coordinates(&to), (0.0, 0.0, 0.0));
    }
}

#[test]
fn self_referential_records() {
    let store = Store::create();
    let tail = Record::new::<Node>().with("id", 2u32).unwrap();
    let head = Record::new::<Node>()
        .with("id", 1u32)
        .and_then(|n| n.with("next", tail))
        .unwrap();
    let reference = store.push(&head, Some("head")).unwrap();
    assert_eq!(reference.row(), 1);

    store.combine().unwrap();
    let head = store.get::<Node>("head").unwrap().unwrap();
    let tail = Record::try_from(head.get("next").unwrap()).unwrap();
    assert_eq!(tail.get_as::<u32>("id").unwrap(), 2);
    assert!(tail.get("next").unwrap_err().is_state());
}

#[test]
fn normalized_text_and_bytes() {
    let store = Store::create();
    let reading = Record::new::<Reading>()
        .with("sensor", 12u16)
        .and_then(|r| r.with("level", 0.5))
        .and_then(|r| r.with("note", "héllo wörld"))
        .and_then(|r| r.with("raw", vec![1u8, 2, 3]))
        .unwrap();
    store.push(&reading, None).unwrap();
    store.combine().unwrap();

    let layer = store.layer::<Reading>().unwrap();
    let mut row = layer.get(0).unwrap();
    let level: f64 = row.get_as("level").unwrap();
    assert!((level - 0.5).abs() <= 2.0 / 255.0);
    assert_eq!(row.get("note").unwrap(), Value::WStr("héllo wörld".to_string()));
    assert_eq!(row.get("raw").unwrap(), Value::Bytes(vec![1, 2, 3]));
    assert_eq!(layer.column().unwrap().read::<u8>("level").unwrap()[0], 191);

    row.set("level", -1.0).unwrap();
    assert_eq!(layer.column().unwrap().read::<u8>("level").unwrap()[0], 0);
    assert!(row.set("note", "changed").unwrap_err().is_state());
    assert!(row.set("raw", vec![0u8]).unwrap_err().is_state());
    assert!(row.set("sensor", "text").unwrap_err().is_mismatched_types());
    assert!(row.set("sensor", -1).unwrap_err().is_mismatched_types());
    assert!(row.set("missing", 1).unwrap_err().is_schema());
}

#[test]
fn attached_writes_need_a_fixed_store() {
    let store = Store::create();
    store.push(&point(1.0, 1.0, 1.0), None).unwrap();
    let mut row = store.layer::<Point>().unwrap().get(0).unwrap();
    assert_eq!(row.get_as::<f64>("x").unwrap(), 1.0);
    assert!(row.set("x", 2.0).unwrap_err().is_state());
}

#[test]
fn column_and_row_aliasing() {
    let store = Store::truncate([Scale::new::<Point>(4)]).unwrap();
    let points = store.layer::<Point>().unwrap();
    let columns = points.column().unwrap();
    assert_eq!(columns.len(), 4);

    columns.write::<f64>("y").unwrap()[2] = 7.5;
    assert_eq!(points.get(2).unwrap().get_as::<f64>("y").unwrap(), 7.5);

    points.get(1).unwrap().set("x", 1.25).unwrap();
    {
        let xs = columns.read::<f64>("x").unwrap();
        assert_eq!(&*xs, &[0.0, 1.25, 0.0, 0.0]);
        // row reads may overlap a column read
        assert_eq!(points.get(1).unwrap().get_as::<f64>("x").unwrap(), xs[1]);
    }

    let mut ys = columns.write::<f64>("y").unwrap();
    ys.iter_mut().for_each(|y| *y += 1.0);
    drop(ys);
    let ys: Vec<f64> = points.iter().map(|p| p.get_as("y").unwrap()).collect();
    assert_eq!(ys, [1.0, 1.0, 8.5, 1.0]);
}

#[test]
fn column_access_is_checked() {
    let store = Store::truncate([Scale::new::<Segment>(2), Scale::new::<Point>(2)]).unwrap();
    let points = store.layer::<Point>().unwrap().column().unwrap().clone();
    assert!(points.read::<f32>("x").unwrap_err().is_mismatched_types());
    assert!(points.write::<f64>("w").unwrap_err().is_schema());

    let segments = store.layer::<Segment>().unwrap();
    let columns = segments.column().unwrap();
    assert!(columns.read::<u8>("label").unwrap_err().is_state());
    assert!(columns.read::<u32>("from").unwrap_err().is_state());

    let building = Store::create();
    building.push(&point(0.0, 0.0, 0.0), None).unwrap();
    assert!(building.layer::<Point>().unwrap().column().unwrap_err().is_state());
}

#[test]
fn copy_in_and_link() {
    let store = Store::truncate([Scale::new::<Segment>(2), Scale::new::<Point>(3)]).unwrap();
    let segments = store.layer::<Segment>().unwrap();
    let points = store.layer::<Point>().unwrap();

    let mut first = segments.get(0).unwrap();
    assert!(first.get("from").unwrap_err().is_state());
    assert!(first.set("from", point(1.0, 2.0, 3.0)).unwrap_err().is_state());

    first.link("from", &points.get(1).unwrap()).unwrap();
    first.set("from", point(1.0, 2.0, 3.0)).unwrap();
    assert_eq!(coordinates(&points.get(1).unwrap()), (1.0, 2.0, 3.0));

    // both segments now share the point
    let mut second = segments.get(1).unwrap();
    second.link("to", &points.get(1).unwrap()).unwrap();
    first.set("from", point(4.0, 4.0, 4.0)).unwrap();
    let to = Record::try_from(second.get("to").unwrap()).unwrap();
    assert_eq!(coordinates(&to), (4.0, 4.0, 4.0));

    assert!(first.link("from", &segments.get(1).unwrap()).unwrap_err().is_mismatched_types());
    let other = Store::truncate([Scale::new::<Point>(1)]).unwrap();
    let foreign = other.layer::<Point>().unwrap().get(0).unwrap();
    assert!(first.link("from", &foreign).unwrap_err().is_state());
    assert!(first.link("from", &point(0.0, 0.0, 0.0)).unwrap_err().is_state());
}

#[test]
fn uncommitted_rows_are_discarded() {
    let store = Store::create();
    store.push(&point(0.0, 0.0, 0.0), None).unwrap();
    let points = store.layer::<Point>().unwrap();

    {
        let mut row = points.begin_row().unwrap();
        row.set("x", 1.0).unwrap();
    }
    assert_eq!(points.len(), 1);

    let failed = || -> error::TesseraResult<Reference> {
        let mut row = points.begin_row()?;
        row.set("x", 2.0)?;
        row.set("nope", 3.0)?;
        row.commit()
    };
    assert!(failed().unwrap_err().is_schema());
    assert_eq!(points.len(), 1);

    let mut row = points.begin_row().unwrap();
    row.set("y", 5.0).unwrap();
    store.push(&point(9.0, 9.0, 9.0), None).unwrap();
    let reference = row.commit().unwrap();
    assert_eq!(points.len(), 3);
    assert_eq!(reference.row(), 2);
    assert_eq!(
        coordinates(&store.resolve::<Point>(reference).unwrap()),
        (0.0, 5.0, 0.0)
    );
}

#[test]
fn guarded_rows_push_nested_records() {
    let store = Store::create();
    store.push(&Record::new::<Node>().with("id", 0u32).unwrap(), None).unwrap();
    let nodes = store.layer::<Node>().unwrap();

    let mut row = nodes.begin_row().unwrap();
    row.set("id", 1u32).unwrap();
    row.set("next", Record::new::<Node>().with("id", 2u32).unwrap()).unwrap();
    assert!(row.set("next", point(1.0, 1.0, 1.0)).unwrap_err().is_mismatched_types());
    let reference = row.commit().unwrap();
    assert_eq!(nodes.len(), 3);
    assert_eq!(reference.row(), 2);

    store.combine().unwrap();
    let head = store.resolve::<Node>(reference).unwrap();
    assert_eq!(head.get_as::<u32>("id").unwrap(), 1);
    let next = Record::try_from(head.get("next").unwrap()).unwrap();
    assert_eq!(next.get_as::<u32>("id").unwrap(), 2);
    assert!(next.get("next").unwrap_err().is_state());
}

#[test]
fn pending_rows_are_dropped_by_combine() {
    let store = Store::create();
    store.push(&point(0.0, 0.0, 0.0), None).unwrap();
    let points = store.layer::<Point>().unwrap();
    let row = points.begin_row().unwrap();
    store.combine().unwrap();
    assert!(row.commit().unwrap_err().is_state());
    assert_eq!(points.len(), 1);
}

#[test]
fn cursor() {
    let store = Store::truncate([Scale::new::<Point>(3)]).unwrap();
    let mut points = store.layer::<Point>().unwrap();
    assert!(points.row().unwrap_err().is_state());
    assert_eq!(points.position(), None);

    let mut seen = 0u32;
    while points.next() {
        assert_eq!(points.position(), Some(seen));
        points.row().unwrap().set("x", f64::from(seen)).unwrap();
        seen += 1;
    }
    assert_eq!(seen, 3);
    assert!(!points.next());
    assert!(points.row().unwrap_err().is_state());
    assert_eq!(points.position(), None);

    points.rewind();
    assert_eq!(points.position(), None);
    assert!(points.next());
    assert!(points.next());
    assert_eq!(points.position(), Some(1));
    assert_eq!(points.row().unwrap().get_as::<f64>("x").unwrap(), 1.0);
}

#[test]
fn layer_lookup() {
    let store = Store::create();
    assert!(store.layer::<Point>().unwrap_err().is_not_found());
    store.push(&point(0.0, 0.0, 0.0), None).unwrap();
    assert!(store.layer::<Point>().is_ok());
    assert!(store.layer_as::<Node>("Point").unwrap_err().is_mismatched_types());
    assert_eq!(
        store.layer_of(describe::<Point>(), "Point").unwrap().index(),
        1
    );
}

#[test]
fn build_store_save() {
    let store = Store::create();
    store.push(&point(1.0, 2.0, 3.0), Some("p")).unwrap();
    let dir = tempdir().unwrap();
    let path = dir.path().join("build.tsr");
    store.save(&path).unwrap();
    assert!(!store.is_fixed());

    let loaded = Store::open(&path).unwrap();
    let found = loaded.get::<Point>("p").unwrap().unwrap();
    assert_eq!(coordinates(&found), (1.0, 2.0, 3.0));
}

#[test]
fn missing_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("missing.tsr");
    assert!(Store::load(path.to_str().unwrap(), true).unwrap_err().is_not_found());
}

#[test]
fn combine_is_idempotent() {
    let store = Store::create();
    store.combine().unwrap();
    let layers = store.layers().unwrap();
    store.combine().unwrap();
    assert_eq!(store.layers().unwrap().len(), layers.len());
    assert!(store.push(&point(0.0, 0.0, 0.0), None).unwrap_err().is_state());
}

#[test]
fn unshared_stores() {
    let store = Store::create();
    store.close();
    assert!(!store.is_detached());
    assert!(!store.is_shared());
    #[cfg(unix)]
    assert!(store.unlink().unwrap_err().is_state());
}

#[cfg(unix)]
mod shared {
    use std::process;

    use super::*;

    fn unique(tag: &str) -> String {
        format!("tessera-{}-{tag}", process::id())
    }

    #[test]
    fn shared_memory_parity() {
        let name = unique("parity");
        let store = Store::create();
        let reference = store.push(&point(1.0, 2.0, 3.0), Some("p")).unwrap();
        store.share(&name, false).unwrap();
        assert!(store.is_fixed());
        assert!(store.is_shared());

        let other = Store::load(&name, false).unwrap();
        assert!(other.is_shared());
        let seen = other.get::<Point>("p").unwrap().unwrap();
        assert_eq!(coordinates(&seen), (1.0, 2.0, 3.0));

        // both stores map the same bytes
        store.resolve::<Point>(reference).unwrap().set("x", 10.0).unwrap();
        assert_eq!(seen.get_as::<f64>("x").unwrap(), 10.0);

        store.unlink().unwrap();
        assert!(store.is_detached());
        assert!(store.unlink().unwrap_err().is_state());
        assert!(Store::attach(&name).unwrap_err().is_not_found());
        // the mapping stays valid after the segment is removed
        assert_eq!(seen.get_as::<f64>("y").unwrap(), 2.0);

        other.close();
        assert!(other.is_detached());
        assert!(seen.get("x").unwrap_err().is_state());
        assert!(other.layer::<Point>().unwrap_err().is_state());
    }

    #[test]
    fn share_and_close() {
        let name = unique("close");
        let store = Store::truncate([Scale::new::<Point>(2)]).unwrap();
        store.share(&name, true).unwrap();
        assert!(store.is_detached());
        assert!(!store.is_shared());
        assert!(store.share(&name, false).unwrap_err().is_state());

        let attached = Store::attach(&name).unwrap();
        assert_eq!(attached.layer::<Point>().unwrap().len(), 2);
        drop(attached);
        unlink(&name).unwrap();
        assert!(unlink(&name).unwrap_err().is_not_found());
    }

    #[test]
    fn publish_existing_name_fails() {
        let name = unique("existing");
        let store = Store::truncate([Scale::new::<Point>(1)]).unwrap();
        let segment = publish(&store, &name).unwrap();
        assert_eq!(segment.as_slice(), attach(&name).unwrap().as_slice());
        assert!(publish(&store, &name).is_err());
        unlink(&name).unwrap();
    }
}
