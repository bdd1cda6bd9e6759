//! Page descriptors and the cursor that generates them.
//!
//! A [`PageDescriptor`] names the slice `[page * size, page * size + size)` of
//! an ordered collection. A [`PageCursor`] produces the finite, ordered run of
//! descriptors needed to cover `total_items` entries, `ceil(total_items /
//! page_size)` of them, numbered from zero.
//!
//! Every descriptor of a cursor carries the same `size`, including the last
//! one. Consumers clamp the final partial page themselves; see
//! [`PageDescriptor::bounds`].

use crate::{Error, Result, proto::PaginationDto};
use core::iter::FusedIterator;
use core::ops::Range;

/// One request unit of the pagination protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PageDescriptor {
    page: u32,
    size: u32,
}

impl PageDescriptor {
    /// Creates a descriptor, rejecting a zero `size`.
    pub fn new(page: u32, size: u32) -> Result<Self> {
        if size == 0 {
            return Err(Error::InvalidDescriptor {
                reason: format!("page {page}: size must be greater than 0"),
            });
        }
        Ok(Self { page, size })
    }

    pub const fn page(&self) -> u32 {
        self.page
    }

    pub const fn size(&self) -> u32 {
        self.size
    }

    /// Returns the index range this descriptor selects from a collection of
    /// `len` entries.
    ///
    /// The range is clamped to `len`, so a page that starts past the end is
    /// empty and the final page may be shorter than `size`.
    pub fn bounds(&self, len: usize) -> Range<usize> {
        // Widen before multiplying so `page * size` cannot wrap.
        let start = u64::from(self.page) * u64::from(self.size);
        let end = start + u64::from(self.size);
        let clamp = |v: u64| usize::try_from(v).map_or(len, |v| v.min(len));
        clamp(start)..clamp(end)
    }
}

impl TryFrom<PaginationDto> for PageDescriptor {
    type Error = Error;

    fn try_from(dto: PaginationDto) -> Result<Self> {
        Self::new(dto.page, dto.size)
    }
}

impl From<PageDescriptor> for PaginationDto {
    fn from(descriptor: PageDescriptor) -> Self {
        Self {
            page: descriptor.page,
            size: descriptor.size,
        }
    }
}

/// Generates the descriptors that cover a collection of known length.
///
/// The cursor itself is immutable; [`PageCursor::iter`] can be called any
/// number of times and always restarts from page zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageCursor {
    total_items: usize,
    page_size: u32,
    total_pages: u32,
}

impl PageCursor {
    /// Creates a cursor over `total_items` entries split into pages of
    /// `page_size`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDescriptor`] if `page_size` is zero or if the
    /// number of pages does not fit the `u32` page field of the wire format.
    pub fn new(total_items: usize, page_size: u32) -> Result<Self> {
        if page_size == 0 {
            return Err(Error::InvalidDescriptor {
                reason: "page size must be greater than 0".to_string(),
            });
        }

        let pages = (total_items as u64).div_ceil(u64::from(page_size));
        let total_pages = u32::try_from(pages).map_err(|_| Error::InvalidDescriptor {
            reason: format!("{pages} pages exceed the maximum page index"),
        })?;

        Ok(Self {
            total_items,
            page_size,
            total_pages,
        })
    }

    pub const fn total_items(&self) -> usize {
        self.total_items
    }

    pub const fn page_size(&self) -> u32 {
        self.page_size
    }

    /// `ceil(total_items / page_size)`.
    pub const fn total_pages(&self) -> u32 {
        self.total_pages
    }

    /// Returns a lazy iterator over the descriptors, starting at page zero.
    pub const fn iter(&self) -> Pages {
        Pages {
            next: 0,
            end: self.total_pages,
            size: self.page_size,
        }
    }
}

impl IntoIterator for &PageCursor {
    type Item = PageDescriptor;
    type IntoIter = Pages;

    fn into_iter(self) -> Pages {
        self.iter()
    }
}

/// Iterator returned by [`PageCursor::iter`].
#[derive(Clone, Debug)]
pub struct Pages {
    next: u32,
    end: u32,
    size: u32,
}

impl Iterator for Pages {
    type Item = PageDescriptor;

    fn next(&mut self) -> Option<PageDescriptor> {
        if self.next >= self.end {
            return None;
        }
        let page = self.next;
        self.next += 1;
        Some(PageDescriptor {
            page,
            size: self.size,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.end - self.next) as usize;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Pages {}

impl FusedIterator for Pages {}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(cursor: &PageCursor) -> Vec<(u32, u32)> {
        cursor.iter().map(|d| (d.page(), d.size())).collect()
    }

    #[test]
    fn page_count_is_ceiling_of_items_over_size() {
        for total in 0..64_usize {
            for size in 1..12_u32 {
                let cursor = PageCursor::new(total, size).unwrap();
                let expected = total.div_ceil(size as usize);
                assert_eq!(cursor.iter().count(), expected, "{total}/{size}");
                assert_eq!(cursor.iter().len(), expected);
                assert_eq!(cursor.total_pages() as usize, expected);
            }
        }
    }

    #[test]
    fn empty_collection_yields_no_descriptors() {
        let cursor = PageCursor::new(0, 10).unwrap();
        assert_eq!(cursor.iter().next(), None);
    }

    #[test]
    fn short_collection_yields_one_full_width_descriptor() {
        let cursor = PageCursor::new(3, 10).unwrap();
        assert_eq!(pairs(&cursor), vec![(0, 10)]);
    }

    #[test]
    fn final_page_keeps_declared_size() {
        let cursor = PageCursor::new(7, 3).unwrap();
        assert_eq!(pairs(&cursor), vec![(0, 3), (1, 3), (2, 3)]);

        let sizes: Vec<usize> = cursor.iter().map(|d| d.bounds(7).len()).collect();
        assert_eq!(sizes, vec![3, 3, 1]);
    }

    #[test]
    fn iteration_restarts_from_page_zero() {
        let cursor = PageCursor::new(10, 4).unwrap();
        let mut first = cursor.iter();
        first.next();
        first.next();
        assert_eq!(pairs(&cursor), vec![(0, 4), (1, 4), (2, 4)]);
        assert_eq!((&cursor).into_iter().count(), 3);
    }

    #[test]
    fn zero_page_size_is_rejected() {
        assert!(matches!(
            PageCursor::new(10, 0),
            Err(Error::InvalidDescriptor { .. })
        ));
        assert!(matches!(
            PageDescriptor::new(0, 0),
            Err(Error::InvalidDescriptor { .. })
        ));
    }

    #[test]
    fn bounds_clamp_to_collection_length() {
        let d = PageDescriptor::new(5, 4).unwrap();
        assert_eq!(d.bounds(10), 10..10);

        let d = PageDescriptor::new(u32::MAX, u32::MAX).unwrap();
        assert!(d.bounds(3).is_empty());
    }

    #[test]
    fn descriptor_round_trips_through_wire_message() {
        let dto = PaginationDto { page: 2, size: 25 };
        let d = PageDescriptor::try_from(dto).unwrap();
        assert_eq!((d.page(), d.size()), (2, 25));
        assert_eq!(PaginationDto::from(d), PaginationDto { page: 2, size: 25 });

        assert!(PageDescriptor::try_from(PaginationDto { page: 1, size: 0 }).is_err());
    }
}
