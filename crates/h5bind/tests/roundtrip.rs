//! Element layouts surviving a write, a close and a read back.

use std::mem::{offset_of, size_of};

use h5bind::prelude::*;
use h5bind::{
    Datatype, File, FixedAscii, FixedUnicode, PropertyList, PropertyListClass, TypeDescriptor,
    VarLenUnicode,
};

#[derive(H5Type, Clone, Copy, Debug, PartialEq)]
#[repr(C)]
struct Point {
    x: f64,
    y: f64,
}

#[derive(H5Type, Clone, Debug, PartialEq)]
#[repr(C)]
struct Reading {
    id: u32,
    station: FixedAscii<6>,
    flag: bool,
    samples: [[i16; 3]; 2],
    origin: Point,
    #[h5(rename = "label")]
    note: VarLenUnicode,
}

#[derive(H5Type, Clone, Copy, Debug, PartialEq)]
struct Pair(u8, i64);

fn reading(id: u32, station: &str, note: &str) -> Reading {
    Reading {
        id,
        station: FixedAscii::try_from_str(station).unwrap(),
        flag: id % 2 == 0,
        samples: [[1, 2, 3], [-4, -5, id as i16]],
        origin: Point {
            x: id as f64,
            y: -0.5,
        },
        note: note.parse().unwrap(),
    }
}

// ---------------------------------------------------------------------------
// Atomic and array shapes
// ---------------------------------------------------------------------------

#[test]
fn atomic_values_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("atomic.h5");
    {
        let file = File::create(&path).unwrap();
        file.new_dataset::<i8>("i8", 3usize).unwrap().write(&[-1i8, 0, 1]).unwrap();
        file.new_dataset::<u64>("u64", 2usize).unwrap().write(&[u64::MAX, 7]).unwrap();
        file.new_dataset::<f32>("f32", 2usize).unwrap().write(&[1.5f32, -0.25]).unwrap();
        file.new_dataset::<bool>("bool", 3usize).unwrap().write(&[true, false, true]).unwrap();
        file.new_dataset::<usize>("usize", 1usize).unwrap().write(&[42usize]).unwrap();
        file.close().unwrap();
    }
    let file = File::open(&path).unwrap();
    assert_eq!(file.dataset("i8").unwrap().read::<i8>().unwrap(), vec![-1, 0, 1]);
    assert_eq!(file.dataset("u64").unwrap().read::<u64>().unwrap(), vec![u64::MAX, 7]);
    assert_eq!(file.dataset("f32").unwrap().read::<f32>().unwrap(), vec![1.5, -0.25]);
    assert_eq!(file.dataset("bool").unwrap().read::<bool>().unwrap(), vec![true, false, true]);
    assert_eq!(file.dataset("usize").unwrap().read::<usize>().unwrap(), vec![42]);
}

#[test]
fn fixed_arrays_and_text() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("arrays.h5");
    let matrices = [[[1u16, 2], [3, 4]], [[5, 6], [7, 8]]];
    let names = [
        FixedUnicode::<8>::try_from_str("héllo").unwrap(),
        FixedUnicode::<8>::try_from_str("").unwrap(),
    ];
    {
        let file = File::create(&path).unwrap();
        file.new_dataset::<[[u16; 2]; 2]>("matrices", 2usize)
            .unwrap()
            .write(&matrices)
            .unwrap();
        file.new_dataset::<FixedUnicode<8>>("names", 2usize)
            .unwrap()
            .write(&names)
            .unwrap();
    }
    let file = File::open(&path).unwrap();
    let ds = file.dataset("matrices").unwrap();
    assert_eq!(
        ds.dtype().unwrap().to_descriptor().unwrap(),
        <[[u16; 2]; 2]>::type_descriptor()
    );
    assert_eq!(ds.read::<[[u16; 2]; 2]>().unwrap(), matrices.to_vec());
    let back = file.dataset("names").unwrap().read::<FixedUnicode<8>>().unwrap();
    assert_eq!(back[0], "héllo");
    assert!(back[1].is_empty());
}

// ---------------------------------------------------------------------------
// Compound shapes
// ---------------------------------------------------------------------------

#[test]
fn compound_with_nested_array_and_text() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("compound.h5");
    let written = vec![reading(1, "north", "first"), reading(2, "south", ""), reading(3, "east", "ünï")];
    {
        let file = File::create(&path).unwrap();
        let ds = file.new_dataset::<Reading>("readings", written.len()).unwrap();
        ds.write(&written).unwrap();
        let attr = ds.new_attr::<Reading>("latest", ()).unwrap();
        attr.write_scalar(&written[2]).unwrap();
        file.close().unwrap();
    }
    let file = File::open(&path).unwrap();
    let ds = file.dataset("readings").unwrap();
    assert!(ds.dtype().unwrap().descriptor_matches::<Reading>().unwrap());
    assert_eq!(ds.read::<Reading>().unwrap(), written);
    assert_eq!(ds.attr("latest").unwrap().read_scalar::<Reading>().unwrap(), written[2]);

    let mut buf = vec![reading(9, "x", "stale"); 4];
    assert_eq!(ds.read_into(&mut buf).unwrap(), 3);
    assert_eq!(&buf[..3], &written[..]);
    assert_eq!(buf[3].id, 9);
}

#[test]
fn tuple_structs_use_index_names() {
    let TypeDescriptor::Compound(compound) = Pair::type_descriptor() else {
        panic!("expected a compound");
    };
    let names: Vec<_> = compound.fields.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, ["0", "1"]);
    assert_eq!(compound.size, size_of::<Pair>());

    let dir = tempfile::tempdir().unwrap();
    let file = File::create(dir.path().join("pairs.h5")).unwrap();
    let ds = file.new_dataset::<Pair>("pairs", 2usize).unwrap();
    ds.write(&[Pair(1, -1), Pair(2, i64::MIN)]).unwrap();
    assert_eq!(ds.read::<Pair>().unwrap(), vec![Pair(1, -1), Pair(2, i64::MIN)]);
}

// ---------------------------------------------------------------------------
// Offset fidelity
// ---------------------------------------------------------------------------

#[test]
fn offsets_match_the_compiler() {
    let expected = [
        ("id", offset_of!(Reading, id)),
        ("station", offset_of!(Reading, station)),
        ("flag", offset_of!(Reading, flag)),
        ("samples", offset_of!(Reading, samples)),
        ("origin", offset_of!(Reading, origin)),
        ("label", offset_of!(Reading, note)),
    ];

    let TypeDescriptor::Compound(host) = Reading::type_descriptor() else {
        panic!("expected a compound");
    };
    assert_eq!(host.size, size_of::<Reading>());
    for (name, offset) in expected {
        assert_eq!(host.field(name).unwrap().offset, offset, "host offset of {name}");
    }

    let native = Datatype::from_type::<Reading>().unwrap();
    assert_eq!(native.size().unwrap(), size_of::<Reading>());
    let TypeDescriptor::Compound(reflected) = native.to_descriptor().unwrap() else {
        panic!("expected a compound");
    };
    assert_eq!(reflected.size, size_of::<Reading>());
    for (name, offset) in expected {
        assert_eq!(reflected.field(name).unwrap().offset, offset, "native offset of {name}");
    }
    let TypeDescriptor::Compound(origin) = &reflected.field("origin").unwrap().ty else {
        panic!("expected a nested compound");
    };
    assert_eq!(origin.field("y").unwrap().offset, offset_of!(Point, y));
}

// ---------------------------------------------------------------------------
// Extents
// ---------------------------------------------------------------------------

#[test]
fn resizable_dataset_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("extent.h5");
    {
        let file = File::create(&path).unwrap();
        let space = h5bind::Dataspace::create_simple(&[20, 5], Some(&[Some(40), Some(5)])).unwrap();
        let dtype = Datatype::from_type::<u16>().unwrap();
        let dcpl = PropertyList::new(PropertyListClass::DatasetCreate).unwrap();
        dcpl.set_chunk(&[10, 5]).unwrap();
        let ds = file.create_dataset("grid", &dtype, &space, Some(&dcpl)).unwrap();
        let values: Vec<u16> = (0..100).collect();
        ds.write(&values).unwrap();
        ds.close().unwrap();
        file.close().unwrap();
    }

    let file = File::open(&path).unwrap();
    let ds = file.dataset("grid").unwrap();
    assert_eq!(ds.shape().unwrap(), vec![20, 5]);
    assert_eq!(ds.maxdims().unwrap(), vec![Some(40), Some(5)]);
    let values = ds.read::<u16>().unwrap();
    assert_eq!(&values[..5], &[0, 1, 2, 3, 4]);
    assert!(matches!(ds.set_extent(&[30, 5]), Err(h5bind::Error::ReadOnly(_))));
    file.close().unwrap();

    let file = File::open_rw(&path).unwrap();
    let ds = file.dataset("grid").unwrap();
    ds.set_extent(&[30, 5]).unwrap();
    assert_eq!(ds.shape().unwrap(), vec![30, 5]);
    let grown = ds.read::<u16>().unwrap();
    assert_eq!(grown.len(), 150);
    assert_eq!(&grown[..100], &values[..]);
    assert!(grown[100..].iter().all(|&v| v == 0));
    assert!(matches!(ds.set_extent(&[41, 5]), Err(h5bind::Error::RangeError(_))));
    assert!(matches!(ds.set_extent(&[25, 5]), Err(h5bind::Error::RangeError(_))));
    assert_eq!(ds.shape().unwrap(), vec![30, 5]);
    assert_eq!(&ds.read::<u16>().unwrap()[..100], &values[..]);
}

#[test]
fn contiguous_dataset_with_room_to_grow() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("contiguous.h5");
    {
        let file = File::create(&path).unwrap();
        let space = h5bind::Dataspace::create_simple(&[20, 5], Some(&[Some(40), Some(5)])).unwrap();
        let dtype = Datatype::from_type::<u16>().unwrap();
        let ds = file.create_dataset("grid", &dtype, &space, None).unwrap();
        let values: Vec<u16> = (0..100).collect();
        ds.write(&values).unwrap();
        ds.close().unwrap();
        file.close().unwrap();
    }

    let file = File::open(&path).unwrap();
    assert!(file.is_read_only().unwrap());
    let ds = file.dataset("grid").unwrap();
    assert_eq!(ds.layout().unwrap(), h5bind::Layout::Contiguous);
    assert_eq!(ds.shape().unwrap(), vec![20, 5]);
    assert_eq!(ds.maxdims().unwrap(), vec![Some(40), Some(5)]);
    let values = ds.read::<u16>().unwrap();
    assert_eq!(values.len(), 100);
    assert_eq!(&values[..5], &[0, 1, 2, 3, 4]);
}
