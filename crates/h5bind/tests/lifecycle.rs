//! Handle lifecycle: explicit close, drop, stale children.

use h5bind::prelude::*;
use h5bind::{
    Dataspace, Datatype, Error, File, PropertyList, PropertyListClass,
};

fn scratch(name: &str) -> (tempfile::TempDir, File) {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = tempfile::tempdir().unwrap();
    let file = File::create(dir.path().join(name)).unwrap();
    (dir, file)
}

// ---------------------------------------------------------------------------
// Idempotent close
// ---------------------------------------------------------------------------

#[test]
fn close_twice_for_every_kind() {
    let (_dir, file) = scratch("close.h5");
    let group = file.create_group("g").unwrap();
    let dataset = group.new_dataset::<i64>("d", 3usize).unwrap();
    let attr = dataset.new_attr::<u8>("a", ()).unwrap();
    let space = Dataspace::try_new([2usize, 2]).unwrap();
    let dtype = Datatype::from_type::<f32>().unwrap();
    let plist = PropertyList::new(PropertyListClass::DatasetCreate).unwrap();

    attr.close().unwrap();
    attr.close().unwrap();
    dataset.close().unwrap();
    dataset.close().unwrap();
    group.close().unwrap();
    group.close().unwrap();
    space.close().unwrap();
    space.close().unwrap();
    dtype.close().unwrap();
    dtype.close().unwrap();
    plist.close().unwrap();
    plist.close().unwrap();
    file.close().unwrap();
    file.close().unwrap();

    for valid in [
        attr.is_valid(),
        dataset.is_valid(),
        group.is_valid(),
        space.is_valid(),
        dtype.is_valid(),
        plist.is_valid(),
        file.is_valid(),
    ] {
        assert!(!valid);
    }
}

#[test]
fn released_handles_fail_fast() {
    let (_dir, file) = scratch("released.h5");
    let dataset = file.new_dataset::<u8>("d", 2usize).unwrap();
    dataset.close().unwrap();
    assert!(matches!(dataset.shape(), Err(Error::InvalidHandle)));
    assert!(matches!(dataset.write(&[1u8, 2]), Err(Error::InvalidHandle)));
    assert!(matches!(dataset.id(), Err(Error::InvalidHandle)));
}

#[test]
fn drop_releases_children() {
    let (_dir, file) = scratch("drop.h5");
    assert_eq!(file.open_object_count().unwrap(), 1);
    {
        let group = file.create_group("g").unwrap();
        let _dataset = group.new_dataset::<u8>("d", 1usize).unwrap();
        let _attr = group.new_attr::<u8>("a", ()).unwrap();
        assert_eq!(file.open_object_count().unwrap(), 4);
    }
    assert_eq!(file.open_object_count().unwrap(), 1);
}

// ---------------------------------------------------------------------------
// Stale children
// ---------------------------------------------------------------------------

#[test]
fn children_go_stale_when_file_closes() {
    let (_dir, file) = scratch("stale.h5");
    let group = file.create_group("g").unwrap();
    let dataset = group.new_dataset::<u16>("d", 2usize).unwrap();
    let attr = group.new_attr::<u16>("a", ()).unwrap();

    file.close().unwrap();

    assert!(!group.is_valid());
    assert!(matches!(group.member_names(), Err(Error::InvalidHandle)));
    assert!(matches!(dataset.read::<u16>(), Err(Error::InvalidHandle)));
    assert!(matches!(attr.read_scalar::<u16>(), Err(Error::InvalidHandle)));

    attr.close().unwrap();
    dataset.close().unwrap();
    group.close().unwrap();
}

#[test]
fn second_file_handle_keeps_file_open() {
    let (_dir, file) = scratch("shared.h5");
    let group = file.create_group("g").unwrap();
    let other = group.file().unwrap();
    assert_ne!(other, file);
    file.close().unwrap();
    assert!(group.is_valid());
    assert_eq!(group.name().unwrap(), "/g");
    other.close().unwrap();
    assert!(!group.is_valid());
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

#[test]
fn equality_is_handle_identity() {
    let (_dir, file) = scratch("identity.h5");
    let a = file.create_group("a").unwrap();
    let again = file.group("a").unwrap();
    assert_eq!(a, a);
    assert_ne!(a, again);

    let t1 = Datatype::from_type::<u32>().unwrap();
    let t2 = Datatype::from_type::<u32>().unwrap();
    assert_ne!(t1, t2);
    assert!(t1.same_layout(&t2).unwrap());
}

#[test]
fn default_lists_outlive_close() {
    let fapl = PropertyList::default_for(PropertyListClass::FileAccess);
    fapl.close().unwrap();
    assert!(fapl.is_valid());
    assert!(matches!(
        fapl.set_sieve_buf_size(1),
        Err(Error::UnsupportedOperation(_))
    ));
}
