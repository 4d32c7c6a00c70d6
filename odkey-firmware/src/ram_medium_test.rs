extern crate std;

use std::vec;

use super::*;

#[test]
fn begin_zeroes_buffer() {
    let mut buf = [0xaa; 32];
    {
        let mut medium = RamMedium::new(&mut buf);
        assert_eq!(medium.capacity(), 32);
        medium.begin(4).unwrap();
    }
    assert_eq!(buf, [0; 32]);
}

#[test]
fn append_and_read() {
    let mut buf = [0; 16];
    let mut medium = RamMedium::new(&mut buf);
    medium.begin(6).unwrap();

    medium.append(0, &[1, 2, 3]).unwrap();
    medium.append(3, &[4, 5, 6]).unwrap();
    medium.flush().unwrap();

    let mut read_back = [0; 6];
    medium.read(0, &mut read_back).unwrap();
    assert_eq!(read_back, [1, 2, 3, 4, 5, 6]);

    assert_eq!(medium.append(14, &[1, 2, 3]), Err(StorageError::OutOfBounds));
    assert_eq!(medium.read(15, &mut read_back), Err(StorageError::OutOfBounds));
}

#[test]
fn header_is_volatile() {
    let mut buf = [0; 16];
    let mut medium = RamMedium::new(&mut buf);
    assert_eq!(medium.read_header(), Ok(0));

    medium.write_header(6).unwrap();
    assert_eq!(medium.read_header(), Ok(6));
    assert_eq!(medium.write_header(17), Err(StorageError::InvalidSize));

    medium.begin(3).unwrap();
    assert_eq!(medium.read_header(), Ok(0));

    medium.write_header(3).unwrap();
    medium.erase().unwrap();
    assert_eq!(medium.read_header(), Ok(0));
}

#[test]
fn invalid_begin() {
    let mut buf = [0; 16];
    let mut medium = RamMedium::new(&mut buf);

    assert_eq!(medium.begin(0), Err(StorageError::InvalidSize));
    assert_eq!(medium.begin(17), Err(StorageError::InvalidSize));
}

#[test]
fn capacity_capped_at_max_size() {
    let mut buf = vec![0; RAM_MAX_SIZE as usize + 64];
    let mut medium = RamMedium::new(&mut buf);

    assert_eq!(medium.capacity(), RAM_MAX_SIZE);
    assert_eq!(medium.begin(RAM_MAX_SIZE + 1), Err(StorageError::InvalidSize));
    medium.begin(RAM_MAX_SIZE).unwrap();
    assert_eq!(
        medium.write_header(RAM_MAX_SIZE + 1),
        Err(StorageError::InvalidSize)
    );
}
