use std::{
    ffi::c_void,
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use super::*;

// Tests observing the process-wide counters or allocator set take this lock.
static SERIAL: Mutex<()> = Mutex::new(());

static COUNTED_MALLOCS: AtomicUsize = AtomicUsize::new(0);
static COUNTED_FREES: AtomicUsize = AtomicUsize::new(0);

unsafe extern "C" fn counted_malloc(size: usize) -> *mut c_void {
    COUNTED_MALLOCS.fetch_add(1, Ordering::SeqCst);
    unsafe { libc::malloc(size) }
}

unsafe extern "C" fn counted_free(ptr: *mut c_void) {
    COUNTED_FREES.fetch_add(1, Ordering::SeqCst);
    unsafe { libc::free(ptr) }
}

fn counted_functions() -> MemoryFunctions {
    MemoryFunctions {
        malloc: counted_malloc,
        free: counted_free,
        ..MemoryFunctions::system()
    }
}

#[test]
fn test_allocate_and_free() {
    let _serial = SERIAL.lock().unwrap();
    let before = outstanding_allocations();
    let ptr = allocate(64).expect("allocate 64");
    assert_eq!(outstanding_allocations(), before + 1);
    unsafe {
        std::ptr::write_bytes(ptr.as_ptr(), 0xAB, 64);
        assert_eq!(*ptr.as_ptr().add(63), 0xAB);
        free(ptr.as_ptr());
    }
    assert_eq!(outstanding_allocations(), before);
}

#[test]
fn test_allocate_zero_size() {
    let _serial = SERIAL.lock().unwrap();
    let ptr = allocate(0).expect("zero-size allocation is treated as one byte");
    unsafe {
        *ptr.as_ptr() = 7;
        free(ptr.as_ptr());
    }
}

#[test]
fn test_zero_allocate_is_zeroed() {
    let _serial = SERIAL.lock().unwrap();
    let ptr = zero_allocate(16, 4).expect("calloc");
    let bytes = unsafe { std::slice::from_raw_parts(ptr.as_ptr(), 64) };
    assert!(bytes.iter().all(|&b| b == 0));
    unsafe { free(ptr.as_ptr()) };
}

#[test]
fn test_zero_allocate_overflow_fails() {
    let _serial = SERIAL.lock().unwrap();
    let before = outstanding_allocations();
    assert!(zero_allocate(usize::MAX, 2).is_none());
    assert_eq!(outstanding_allocations(), before);
}

#[test]
fn test_reallocate_preserves_prefix() {
    let _serial = SERIAL.lock().unwrap();
    let before = outstanding_allocations();
    let ptr = allocate(8).unwrap();
    unsafe {
        for i in 0..8 {
            *ptr.as_ptr().add(i) = i as u8;
        }
        let grown = reallocate(ptr.as_ptr(), 4096).expect("grow");
        let prefix = std::slice::from_raw_parts(grown.as_ptr(), 8);
        assert_eq!(prefix, &[0, 1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(outstanding_allocations(), before + 1);
        free(grown.as_ptr());
    }
    assert_eq!(outstanding_allocations(), before);
}

#[test]
fn test_reallocate_null_allocates() {
    let _serial = SERIAL.lock().unwrap();
    let before = outstanding_allocations();
    let ptr = unsafe { reallocate(std::ptr::null_mut(), 32) }.expect("realloc(null)");
    assert_eq!(outstanding_allocations(), before + 1);
    unsafe { free(ptr.as_ptr()) };
    assert_eq!(outstanding_allocations(), before);
}

#[test]
fn test_free_null_is_noop() {
    let _serial = SERIAL.lock().unwrap();
    let before = outstanding_allocations();
    unsafe {
        free(std::ptr::null_mut());
        free_with(libc::free, std::ptr::null_mut());
    }
    assert_eq!(outstanding_allocations(), before);
}

#[test]
fn test_frees_with() {
    let system = MemoryFunctions::system();
    assert!(system.frees_with(libc::free));
    assert!(!system.frees_with(counted_free));
    assert!(counted_functions().frees_with(counted_free));
    assert_eq!(system, MemoryFunctions::default());
    assert_ne!(system, counted_functions());
}

#[test]
fn test_replace_and_restore_memory_functions() {
    let _serial = SERIAL.lock().unwrap();
    assert_eq!(memory_functions(), original_memory_functions());

    unsafe { set_memory_functions(counted_functions()) };
    assert_eq!(memory_functions(), counted_functions());
    assert_ne!(memory_functions(), original_memory_functions());

    let mallocs = COUNTED_MALLOCS.load(Ordering::SeqCst);
    let frees = COUNTED_FREES.load(Ordering::SeqCst);
    let ptr = allocate(100).unwrap();
    unsafe { free(ptr.as_ptr()) };
    assert_eq!(COUNTED_MALLOCS.load(Ordering::SeqCst), mallocs + 1);
    assert_eq!(COUNTED_FREES.load(Ordering::SeqCst), frees + 1);

    unsafe { set_memory_functions(original_memory_functions()) };
    assert_eq!(memory_functions(), original_memory_functions());
}

#[test]
fn test_captured_free_survives_replacement() {
    let _serial = SERIAL.lock().unwrap();
    let functions = counted_functions();
    let ptr = functions.allocate(10).unwrap();
    let frees = COUNTED_FREES.load(Ordering::SeqCst);
    // The active set is the system one; releasing through the captured set still
    // reaches the function that owns the memory.
    unsafe { functions.free(ptr.as_ptr()) };
    assert_eq!(COUNTED_FREES.load(Ordering::SeqCst), frees + 1);
}
