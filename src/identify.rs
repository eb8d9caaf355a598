use core::ffi::CStr;

/// Asks the dynamic linker for the name of the symbol closest below `addr`.
/// Only exported symbols are known to it, so static functions come back as
/// `None` or as whatever exported symbol precedes them.
pub fn identify(addr: u64) -> Option<&'static CStr> {
    let addr = usize::try_from(addr).ok()?;
    unsafe {
        let mut info: libc::Dl_info = core::mem::zeroed();

        if libc::dladdr(core::ptr::with_exposed_provenance(addr), &mut info) == 0 {
            return None;
        }

        if !info.dli_sname.is_null() {
            let sym_name = CStr::from_ptr(info.dli_sname);
            return Some(sym_name);
        }

        None
    }
}
