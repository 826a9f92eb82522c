//! Set properties of compiled keyword queries.

use std::collections::{BTreeMap, BTreeSet};

use literature_review::{compile, filter::evaluate, models::Record};
use proptest::prelude::*;

const WORDS: [&str; 6] = ["alpha", "beta", "gamma", "delta", "ledger", "forensics"];

fn word() -> impl Strategy<Value = &'static str> {
    prop::sample::select(WORDS.to_vec())
}

fn text() -> impl Strategy<Value = Option<String>> {
    prop::option::of(prop::collection::vec(word(), 0..4).prop_map(|words| {
        words
            .iter()
            .enumerate()
            .map(|(i, w)| if i % 2 == 0 { w.to_uppercase() } else { w.to_string() })
            .collect::<Vec<_>>()
            .join(" ")
    }))
}

fn corpus() -> impl Strategy<Value = Vec<Record>> {
    prop::collection::vec((text(), text(), text()), 0..12).prop_map(|rows| {
        rows.into_iter()
            .enumerate()
            .map(|(i, (title, abstract_text, keywords))| {
                let mut fields = BTreeMap::new();
                for (name, value) in [("title", title), ("abstract", abstract_text), ("keywords", keywords)] {
                    if let Some(value) = value {
                        fields.insert(name.to_string(), value);
                    }
                }
                Record::new(i as i64 + 1, "scopus", fields)
            })
            .collect()
    })
}

fn containing(records: &[Record], keyword: &str) -> BTreeSet<i64> {
    records
        .iter()
        .filter(|record| {
            [record.title(), record.abstract_text(), record.keywords()]
                .iter()
                .flatten()
                .any(|value| value.to_lowercase().contains(keyword))
        })
        .map(|record| record.unique_id)
        .collect()
}

proptest! {
    #[test]
    fn single_keyword_matches_substring_set(records in corpus(), keyword in word()) {
        let query = compile(&format!("({})", keyword)).unwrap();
        prop_assert_eq!(evaluate(&query, &records), containing(&records, keyword));
    }

    #[test]
    fn and_of_groups_is_intersection(records in corpus(), a in word(), b in word()) {
        let left = evaluate(&compile(&format!("({})", a)).unwrap(), &records);
        let right = evaluate(&compile(&format!("({})", b)).unwrap(), &records);
        let both = evaluate(&compile(&format!("({}) AND ({})", a, b)).unwrap(), &records);
        prop_assert_eq!(both, left.intersection(&right).copied().collect::<BTreeSet<_>>());
    }

    #[test]
    fn or_of_groups_is_union(records in corpus(), a in word(), b in word()) {
        let left = evaluate(&compile(&format!("({})", a)).unwrap(), &records);
        let right = evaluate(&compile(&format!("({})", b)).unwrap(), &records);
        let either = evaluate(&compile(&format!("({}) OR ({})", a, b)).unwrap(), &records);
        prop_assert_eq!(either, left.union(&right).copied().collect::<BTreeSet<_>>());
    }

    #[test]
    fn query_case_does_not_matter(records in corpus(), keyword in word()) {
        let lower = evaluate(&compile(&format!("({})", keyword)).unwrap(), &records);
        let upper = evaluate(&compile(&format!("({})", keyword.to_uppercase())).unwrap(), &records);
        prop_assert_eq!(lower, upper);
    }
}
