//! Test descriptor / binder, part two: expansion and filtering.

use rand::seq::SliceRandom;
use std::os::raw::c_void;

use crate::descriptor::TestDescriptor;
use crate::options::{Filter, Options};

/// A descriptor plus a concrete index (and, for table tests, a pointer to
/// the `i`-th element), with filters already applied.
#[derive(Debug)]
pub struct BoundTest {
    pub descriptor: &'static TestDescriptor,
    pub index: i64,
    pub item: *const c_void,
    pub name: String,
    pub enabled: bool,
}

// `item` only ever points at static/leaked table data supplied at
// registration time; `BoundTest`s are read-only once built.
unsafe impl Send for BoundTest {}
unsafe impl Sync for BoundTest {}

impl BoundTest {
    pub fn timeout_s(&self, options: &Options) -> f64 {
        self.descriptor.timeout_s.unwrap_or(options.timeout_s)
    }
}

/// Expands a flat descriptor list into bound tests: one per descriptor, or
/// one per integer in `[range_lo, range_hi)` for ranged descriptors, naming
/// ranged variants `"<base>:<i>"`. Applies filters and `options.bench`
/// (unset benchmarks are bound but left disabled, matching plain-filtered
/// tests) to compute each `enabled` bit, then shuffles the result.
pub fn bind(
    descriptors: &[&'static TestDescriptor],
    options: &Options,
) -> Vec<BoundTest> {
    let mut out = Vec::new();
    for desc in descriptors {
        if desc.is_ranged {
            for i in desc.range_lo..desc.range_hi {
                let item = desc
                    .table
                    .map(|(base, elem_size)| unsafe {
                        base.add((i as usize) * elem_size)
                    })
                    .unwrap_or(std::ptr::null());
                let name = format!("{}:{}", desc.name, i);
                let enabled = is_enabled(&name, desc.is_bench, options);
                out.push(BoundTest {
                    descriptor: desc,
                    index: i,
                    item,
                    name,
                    enabled,
                });
            }
        } else {
            let enabled = is_enabled(desc.name, desc.is_bench, options);
            out.push(BoundTest {
                descriptor: desc,
                index: 0,
                item: std::ptr::null(),
                name: desc.name.to_string(),
                enabled,
            });
        }
    }
    out.shuffle(&mut rand::thread_rng());
    out
}

fn is_enabled(name: &str, is_bench: bool, options: &Options) -> bool {
    if is_bench && !options.bench {
        return false;
    }
    filter_matches(name, &options.filter)
}

/// Filter matching rules: a test is enabled if the filter list is
/// empty, or if (no positive filter exists and no negative filter matches),
/// or if (some positive filter matches and no negative filter matches).
/// "Matches" means the filter's prefix is a prefix of `name`.
pub fn filter_matches(name: &str, filters: &[Filter]) -> bool {
    if filters.is_empty() {
        return true;
    }
    let positives: Vec<&Filter> = filters.iter().filter(|f| !f.negated).collect();
    let any_negative_matches = filters
        .iter()
        .any(|f| f.negated && name.starts_with(f.prefix.as_str()));
    if any_negative_matches {
        return false;
    }
    positives.is_empty() || positives.iter().any(|f| name.starts_with(f.prefix.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(prefix: &str, negated: bool) -> Filter {
        Filter {
            negated,
            prefix: prefix.to_string(),
        }
    }

    #[test]
    fn empty_filter_list_enables_everything() {
        assert!(filter_matches("anything", &[]));
    }

    #[test]
    fn positive_and_negative_filters() {
        let filters = vec![filter("_a", false), filter("_aa", true)];
        assert!(filter_matches("_ab", &filters));
        assert!(!filter_matches("_aac", &filters));
    }

    #[test]
    fn negative_only_filter() {
        let filters = vec![filter("_x", true)];
        assert!(filter_matches("_y_whatever", &filters));
        assert!(!filter_matches("_x_whatever", &filters));
    }
}
