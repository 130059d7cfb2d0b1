use std::mem::{align_of, size_of};

use super::c;

const SCRATCH_WORDS: usize = c::MAXIMUM_REPARSE_DATA_BUFFER_SIZE as usize / size_of::<u32>();

// The heap block is allocated as u32 words, which gives it the alignment
// REPARSE_DATA_BUFFER requires for the pointer casts below.
const _: () = assert!(align_of::<u32>() % align_of::<c::REPARSE_DATA_BUFFER>() == 0);

/// Zero-initialized scratch sized for the largest reparse record the
/// filesystem will accept or return (`MAXIMUM_REPARSE_DATA_BUFFER_SIZE`,
/// 16 KiB). Reparse records must be built on zeroed memory before their
/// fields are populated.
pub struct ReparseDataScratch {
    words: Box<[u32; SCRATCH_WORDS]>,
}

impl ReparseDataScratch {
    pub fn zeroed() -> Self {
        let boxed: Box<[u32]> = vec![0u32; SCRATCH_WORDS].into_boxed_slice();
        // SAFETY: the slice length is SCRATCH_WORDS by construction.
        let words = unsafe { Box::from_raw(Box::into_raw(boxed) as *mut [u32; SCRATCH_WORDS]) };
        ReparseDataScratch { words }
    }

    pub fn as_mut_ptr(&mut self) -> *mut c::REPARSE_DATA_BUFFER {
        self.words.as_mut_ptr().cast()
    }

    /// # Safety
    ///
    /// The buffer must have been filled by a successful
    /// `FSCTL_GET_REPARSE_POINT` or populated field by field.
    pub unsafe fn assume_init(&self) -> &c::REPARSE_DATA_BUFFER {
        &*self.words.as_ptr().cast()
    }
}
