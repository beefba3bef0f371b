use rstest::rstest;
use tessera_buffer::{AlignedBuffer, Alignment, Region};
use tessera_dtype::{FieldKind, NormRange, PValue};

use crate::*;

fn column(name: &str, kind: FieldKind) -> ColumnDef {
    ColumnDef::new(name, kind).unwrap()
}

fn sample_store() -> BuildStore {
    let mut store = BuildStore::new();
    let names = store.add_layer("_name_").unwrap();
    let points = store.add_layer("Point").unwrap();

    let layer = store.layer_mut(names).unwrap();
    layer.add_field(column("name", FieldKind::Str)).unwrap();
    layer.add_field(column("reference", FieldKind::Ref)).unwrap();

    let layer = store.layer_mut(points).unwrap();
    layer.add_field(column("x", FieldKind::F64)).unwrap();
    layer.add_field(column("id", FieldKind::U32)).unwrap();
    layer
        .add_field(column("weight", FieldKind::U8n).with_range(NormRange::new(0.0, 10.0)))
        .unwrap();
    layer.add_field(column("label", FieldKind::WStr)).unwrap();
    layer.add_field(column("blob", FieldKind::Bytes)).unwrap();
    for i in 0..3u32 {
        layer.begin_row().unwrap();
        layer.set_scalar(0, PValue::F64(f64::from(i) * 1.5)).unwrap();
        layer.set_scalar(1, PValue::U32(i)).unwrap();
        layer.set_scalar(2, PValue::U8(u8::try_from(i * 100).unwrap())).unwrap();
        layer.set_wtext(3, &format!("pünkt {i}")).unwrap();
        layer.set_blob(4, &vec![i as u8; i as usize]).unwrap();
        layer.end_row().unwrap();
    }

    let layer = store.layer_mut(names).unwrap();
    layer.begin_row().unwrap();
    layer.set_text(0, "origin").unwrap();
    layer.set_reference(1, RowRef::new(points, 0)).unwrap();
    layer.end_row().unwrap();
    store
}

fn fixed(store: &BuildStore, options: WriteOptions) -> FixedStore {
    let bytes = options.write(store.layers()).unwrap();
    FixedStore::parse(Region::from(AlignedBuffer::copy_from(bytes, Alignment::new(64)))).unwrap()
}

#[rstest]
#[case(WriteOptions::default())]
#[case(WriteOptions::default().with_alignment(Alignment::new(64)))]
#[case(WriteOptions::default().with_alignment(Alignment::new(2)))]
fn written_store_reads_back(#[case] options: WriteOptions) {
    let store = fixed(&sample_store(), options);
    assert_eq!(store.len(), 2);

    let points = store.layer(store.find_layer("Point").unwrap()).unwrap();
    assert_eq!(points.row_count(), 3);
    assert_eq!(points.get_scalar(0, 2).unwrap(), PValue::F64(3.0));
    assert_eq!(points.get_scalar(1, 1).unwrap(), PValue::U32(1));
    assert_eq!(points.get_scalar(2, 2).unwrap(), PValue::U8(200));
    assert_eq!(points.columns()[2].range(), NormRange::new(0.0, 10.0));
    assert_eq!(points.get_wtext(3, 1).unwrap(), "pünkt 1");
    assert_eq!(points.get_blob(4, 0).unwrap(), &[] as &[u8]);
    assert_eq!(points.get_blob(4, 2).unwrap(), &[2, 2]);
    assert!(points.get_scalar(0, 3).unwrap_err().is_out_of_bounds());

    let names = store.layer(0).unwrap();
    assert_eq!(names.get_text(0, 0).unwrap(), "origin");
    assert_eq!(names.get_reference(1, 0).unwrap(), RowRef::new(1, 0));
}

#[test]
fn pending_rows_are_not_written() {
    let mut store = sample_store();
    let layer = store.layer_mut(1).unwrap();
    layer.begin_row().unwrap();
    layer.set_wtext(3, "unfinished").unwrap();

    let fixed = fixed(&store, WriteOptions::default());
    assert_eq!(fixed.layer(1).unwrap().row_count(), 3);
}

#[test]
fn in_place_updates() {
    let mut store = fixed(&sample_store(), WriteOptions::default());
    store.column_mut::<f64>(1, 0).unwrap()[1] = 42.0;
    store.set_scalar(1, 1, 0, PValue::U32(7)).unwrap();
    store.set_reference(0, 1, 0, RowRef::new(1, 2)).unwrap();

    let points = store.layer(1).unwrap();
    assert_eq!(points.get_scalar(0, 1).unwrap(), PValue::F64(42.0));
    assert_eq!(points.get_scalar(1, 0).unwrap(), PValue::U32(7));
    assert_eq!(store.column::<u32>(1, 1).unwrap(), &[7, 1, 2]);
    assert_eq!(
        store.layer(0).unwrap().get_reference(1, 0).unwrap(),
        RowRef::new(1, 2)
    );

    // the updates are part of the serialized bytes
    let reparsed =
        FixedStore::parse(Region::from(AlignedBuffer::copy_from(store.as_bytes(), Alignment::new(8))))
            .unwrap();
    assert_eq!(reparsed.column::<f64>(1, 0).unwrap()[1], 42.0);
}

#[test]
fn typed_column_access_is_checked() {
    let mut store = fixed(&sample_store(), WriteOptions::default());
    assert!(store.column::<f32>(1, 0).unwrap_err().is_mismatched_types());
    assert!(store.column::<u8>(1, 3).unwrap_err().is_state());
    assert!(store.column::<u8>(1, 2).is_ok());
    assert!(
        store
            .set_scalar(1, 3, 0, PValue::U8(1))
            .unwrap_err()
            .is_state()
    );
    assert!(
        store
            .set_scalar(1, 0, 3, PValue::F64(1.0))
            .unwrap_err()
            .is_out_of_bounds()
    );
}

#[test]
fn rewrite_fixed_store() {
    let store = fixed(&sample_store(), WriteOptions::default());
    let views: Vec<_> = store.layers().collect();
    let bytes = WriteOptions::default().write(&views).unwrap();
    assert_eq!(bytes.as_ref(), store.as_bytes());
}

#[test]
fn truncated_buffer() {
    let bytes = WriteOptions::default().write(sample_store().layers()).unwrap();
    let cut = AlignedBuffer::copy_from(&bytes[..bytes.len() - 1], Alignment::new(8));
    assert!(matches!(
        FixedStore::parse(Region::from(cut)),
        Err(tessera_error::TesseraError::InvalidSerde(..))
    ));
}

#[test]
fn corrupt_footer_length() {
    let bytes = WriteOptions::default().write(sample_store().layers()).unwrap();
    let mut buffer = AlignedBuffer::copy_from(&bytes, Alignment::new(8));
    let len = buffer.len();
    buffer[len - 8..len - 4].copy_from_slice(&u32::MAX.to_le_bytes());
    assert!(FixedStore::parse(Region::from(buffer)).is_err());
}

#[test]
fn overflowing_segment() {
    let footer = Footer {
        layers: vec![LayerFooter {
            name: "Point".to_string(),
            rows: 1,
            columns: vec![ColumnFooter {
                name: "x".to_string(),
                kind: FieldKind::F64.into(),
                vmin: 0.0,
                vmax: 1.0,
                target: None,
                data: SegmentSpec {
                    offset: u64::MAX,
                    length: 8,
                },
                offsets: None,
            }],
        }],
    };
    let footer = footer.to_flexbuffer().unwrap();
    let eof = EndOfFile {
        version: VERSION,
        footer_length: u32::try_from(footer.len()).unwrap(),
    };

    let mut bytes = MAGIC_BYTES.to_vec();
    bytes.extend_from_slice(&footer);
    bytes.extend_from_slice(&eof.to_bytes());
    let buffer = AlignedBuffer::copy_from(&bytes, Alignment::new(8));
    let err = FixedStore::parse(Region::from(buffer)).unwrap_err();
    assert!(matches!(
        err.root(),
        tessera_error::TesseraError::InvalidSerde(..)
    ));
}

#[test]
fn empty_store() {
    let bytes = WriteOptions::default()
        .write::<BuildLayer>(&[])
        .unwrap();
    let store = FixedStore::parse(Region::from(AlignedBuffer::from(bytes))).unwrap();
    assert!(store.is_empty());
}
