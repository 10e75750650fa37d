use serde::Deserialize;

/// `?page=` as sent by the browser; kept raw so junk values fall back to page 1.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub number: u32,
    pub num_pages: u32,
    pub offset: i64,
    pub limit: i64,
}

impl PageWindow {
    pub fn has_previous(&self) -> bool {
        self.number > 1
    }

    pub fn has_next(&self) -> bool {
        self.number < self.num_pages
    }
}

/// Picks the page to show for `total` rows.
///
/// Missing or non-numeric pages select the first one. Numbers out of range,
/// zero and negatives included, select the last one. An empty listing still
/// has a single page.
pub fn paginate(total: i64, per_page: u32, raw_page: Option<&str>) -> PageWindow {
    let per_page = per_page.max(1);
    let total = total.max(0);
    let num_pages = ((total + per_page as i64 - 1) / per_page as i64).max(1) as u32;

    let requested = raw_page
        .and_then(|raw| raw.trim().parse::<i64>().ok())
        .unwrap_or(1);

    let number = if requested < 1 || requested > num_pages as i64 {
        num_pages
    } else {
        requested as u32
    };

    PageWindow {
        number,
        num_pages,
        offset: (number as i64 - 1) * per_page as i64,
        limit: per_page as i64,
    }
}

#[derive(Debug)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub window: PageWindow,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_or_junk_page_is_first() {
        assert_eq!(paginate(35, 10, None).number, 1);
        assert_eq!(paginate(35, 10, Some("abc")).number, 1);
        assert_eq!(paginate(35, 10, Some("")).number, 1);
    }

    #[test]
    fn page_past_the_end_is_last() {
        let w = paginate(35, 10, Some("99"));
        assert_eq!(w.number, 4);
        assert_eq!(w.num_pages, 4);
        assert_eq!(w.offset, 30);
        assert!(w.has_previous());
        assert!(!w.has_next());
    }

    #[test]
    fn non_positive_page_is_last() {
        let w = paginate(35, 10, Some("0"));
        assert_eq!((w.number, w.offset), (4, 30));
        assert_eq!(paginate(35, 10, Some("-3")).number, 4);
        assert_eq!(paginate(0, 10, Some("0")).number, 1);
    }

    #[test]
    fn empty_listing_has_one_page() {
        let w = paginate(0, 10, Some("5"));
        assert_eq!((w.number, w.num_pages, w.offset), (1, 1, 0));
        assert!(!w.has_next());
        assert!(!w.has_previous());
    }

    #[test]
    fn exact_multiple_does_not_add_a_page() {
        assert_eq!(paginate(20, 10, None).num_pages, 2);
        assert_eq!(paginate(21, 10, None).num_pages, 3);
    }
}
