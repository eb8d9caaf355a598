//! # divination
//!
//! the practice of seeking knowledge of the future or the unknown by
//! supernatural means.
//!
//! we ask supernatural means (the dynamic linker and the thread library) for
//! knowledge of where the code we are running lives and how far the stack
//! below us reaches. this is what feeds a walk of the live process; reading
//! a table out of an object file is someone else's job.

use core::ffi;

use crate::walk::CodeRegion;

struct Search {
    addr: u64,
    found: Option<CodeRegion>,
}

unsafe extern "C" fn find_segment(
    info: *mut libc::dl_phdr_info,
    _size: libc::size_t,
    data: *mut ffi::c_void,
) -> ffi::c_int {
    // SAFETY: `code_region` passes a `Search` and the dynamic linker passes
    // a valid `dl_phdr_info` for the duration of the callback.
    let search = unsafe { &mut *data.cast::<Search>() };
    let info = unsafe { &*info };

    if info.dlpi_phdr.is_null() {
        return 0;
    }
    let headers = unsafe { core::slice::from_raw_parts(info.dlpi_phdr, info.dlpi_phnum as usize) };

    for header in headers {
        if header.p_type != libc::PT_LOAD || header.p_flags & libc::PF_X == 0 {
            continue;
        }
        let start = info.dlpi_addr.wrapping_add(header.p_vaddr);
        let end = start.wrapping_add(header.p_memsz);
        if (start..end).contains(&search.addr) {
            search.found = Some(CodeRegion::new(start, end));
            return 1;
        }
    }
    0
}

/// The executable segment of the loaded object that contains `addr`.
#[instrument]
pub fn code_region(addr: u64) -> Option<CodeRegion> {
    let mut search = Search { addr, found: None };
    unsafe {
        libc::dl_iterate_phdr(Some(find_segment), (&raw mut search).cast());
    }
    match search.found {
        Some(region) => trace!("code region {:#x}..{:#x}", region.start, region.end),
        None => trace!("no executable segment contains {addr:#x}"),
    }
    search.found
}

/// The `[low, high)` bounds of the current thread's stack.
#[instrument]
pub fn stack_bounds() -> Option<(u64, u64)> {
    unsafe {
        let mut attr: libc::pthread_attr_t = core::mem::zeroed();
        let ret = libc::pthread_getattr_np(libc::pthread_self(), &mut attr);
        if ret != 0 {
            trace!("pthread_getattr_np returned {ret}");
            return None;
        }

        let mut stack_addr: *mut ffi::c_void = core::ptr::null_mut();
        let mut stack_size: libc::size_t = 0;
        let ret = libc::pthread_attr_getstack(&attr, &mut stack_addr, &mut stack_size);
        libc::pthread_attr_destroy(&mut attr);
        if ret != 0 {
            trace!("pthread_attr_getstack returned {ret}");
            return None;
        }

        let low = stack_addr.addr() as u64;
        trace!("stack {low:#x}, {stack_size:#x} bytes");
        Some((low, low + stack_size as u64))
    }
}
