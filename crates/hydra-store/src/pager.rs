/// Paging state for inline-keyboard lists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pager {
    pub num_pages: usize,
    pub has_prev: bool,
    pub has_next: bool,
    pub prev_page: usize,
    pub next_page: usize,
    pub items_per_page: usize,
    pub current_page: usize,
    pub num_items: usize,
}

/// Clamp `current_page` into `[1, ceil(num_items / items_per_page)]` and
/// derive the navigation flags.
pub fn calc_pager(current_page: usize, items_per_page: usize, num_items: usize) -> Pager {
    let mut pager = Pager {
        num_items,
        items_per_page,
        ..Default::default()
    };

    pager.num_pages = num_items.div_ceil(items_per_page.max(1));

    pager.current_page = if current_page == 0 {
        1
    } else if current_page > pager.num_pages {
        pager.num_pages
    } else {
        current_page
    };

    pager.has_prev = pager.current_page > 1;
    pager.has_next = pager.current_page < pager.num_pages;

    if pager.has_prev {
        pager.prev_page = pager.current_page - 1;
    }
    if pager.has_next {
        pager.next_page = pager.current_page + 1;
    }

    pager
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_page_of_many() {
        let pager = calc_pager(1, 10, 25);
        assert_eq!(pager.num_pages, 3);
        assert!(!pager.has_prev);
        assert!(pager.has_next);
        assert_eq!(pager.next_page, 2);
    }

    #[test]
    fn middle_page_has_both_neighbors() {
        let pager = calc_pager(2, 10, 25);
        assert!(pager.has_prev && pager.has_next);
        assert_eq!(pager.prev_page, 1);
        assert_eq!(pager.next_page, 3);
    }

    #[test]
    fn overflowing_page_clamps_to_last() {
        let pager = calc_pager(99, 10, 25);
        assert_eq!(pager.current_page, 3);
        assert!(pager.has_prev);
        assert!(!pager.has_next);
    }

    #[test]
    fn zero_page_clamps_to_first() {
        let pager = calc_pager(0, 10, 25);
        assert_eq!(pager.current_page, 1);
    }

    #[test]
    fn empty_list_has_no_navigation() {
        let pager = calc_pager(1, 10, 0);
        assert_eq!(pager.num_pages, 0);
        assert!(!pager.has_prev);
        assert!(!pager.has_next);
    }

    #[test]
    fn exact_multiple_rounds_correctly() {
        let pager = calc_pager(2, 10, 20);
        assert_eq!(pager.num_pages, 2);
        assert!(!pager.has_next);
    }
}
