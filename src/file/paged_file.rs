use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::error::{FileError, FileResult};
use super::PageNo;

/// A flat file of consecutive fixed-size pages.
///
/// The file length is always a multiple of the page size, except while
/// [`PagedFile::append_page`] is growing it by one page.
pub struct PagedFile {
    path: PathBuf,
    file: Mutex<File>,
    page_size: usize,
}

impl PagedFile {
    /// Open a paged file, creating an empty one if it does not exist yet
    pub fn open<P: AsRef<Path>>(path: P, page_size: usize) -> FileResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
            page_size,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    fn lock(&self) -> MutexGuard<'_, File> {
        self.file.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn count_pages(&self, file: &File) -> FileResult<u32> {
        let len = file.metadata()?.len();
        Ok((len / self.page_size as u64) as u32)
    }

    /// Number of whole pages currently in the file
    pub fn page_count(&self) -> FileResult<u32> {
        let file = self.lock();
        self.count_pages(&file)
    }

    /// Read exactly one page into `buffer`
    pub fn read_page(&self, page_no: PageNo, buffer: &mut [u8]) -> FileResult<()> {
        self.check_buffer(buffer.len())?;

        let mut file = self.lock();
        let page_count = self.count_pages(&file)?;
        if page_no >= page_count {
            return Err(FileError::PageNotFound {
                page_no,
                page_count,
            });
        }

        file.seek(SeekFrom::Start(self.offset(page_no)))?;
        match file.read_exact(buffer) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(FileError::PageNotFound {
                page_no,
                page_count,
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Write one page. The page must either exist already or be the page
    /// directly after the current end of the file.
    pub fn write_page(&self, page_no: PageNo, buffer: &[u8]) -> FileResult<()> {
        self.check_buffer(buffer.len())?;

        let mut file = self.lock();
        let page_count = self.count_pages(&file)?;
        if page_no > page_count {
            return Err(FileError::PageOutOfRange {
                page_no,
                page_count,
            });
        }

        file.seek(SeekFrom::Start(self.offset(page_no)))?;
        file.write_all(buffer)?;
        Ok(())
    }

    /// Append one page at the end of the file and return its page number.
    /// Counting and writing happen under one lock so concurrent appenders
    /// never pick the same page number.
    pub fn append_page(&self, buffer: &[u8]) -> FileResult<PageNo> {
        self.check_buffer(buffer.len())?;

        let mut file = self.lock();
        let page_no = self.count_pages(&file)?;
        file.seek(SeekFrom::Start(self.offset(page_no)))?;
        file.write_all(buffer)?;
        Ok(page_no)
    }

    /// Flush OS buffers for this file
    pub fn sync(&self) -> FileResult<()> {
        self.lock().sync_data()?;
        Ok(())
    }

    fn offset(&self, page_no: PageNo) -> u64 {
        page_no as u64 * self.page_size as u64
    }

    fn check_buffer(&self, len: usize) -> FileResult<()> {
        if len != self.page_size {
            return Err(FileError::InvalidPageSize {
                expected: self.page_size,
                actual: len,
            });
        }
        Ok(())
    }
}

impl std::fmt::Debug for PagedFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PagedFile")
            .field("path", &self.path)
            .field("page_size", &self.page_size)
            .finish()
    }
}
