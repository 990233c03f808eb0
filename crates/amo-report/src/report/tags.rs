use super::deals::Deal;
use super::normalizer::{normalize_text, NormalizedDeal};
use std::collections::{BTreeMap, HashSet};

const TAG_SEPARATORS: [char; 4] = [';', '|', '/', '\\'];

/// Splits a raw tag cell into distinct display tags.
///
/// `;`, `|`, `/` and `\` are read as commas. Duplicates are detected on the
/// normalized form and the first spelling wins.
pub fn parse_tags(raw: &str) -> Vec<String> {
    let unified = raw.replace(TAG_SEPARATORS, ",");
    let mut seen = HashSet::new();
    let mut tags = Vec::new();

    for piece in unified.split(',') {
        let tag = piece.trim();
        if tag.is_empty() {
            continue;
        }
        if seen.insert(normalize_text(tag)) {
            tags.push(tag.to_string());
        }
    }

    tags
}

/// A tag in both its comparison and display forms.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TagKey {
    pub normalized: String,
    pub display: String,
}

impl TagKey {
    pub fn new(display: &str) -> Self {
        Self {
            normalized: normalize_text(display),
            display: display.trim().to_string(),
        }
    }
}

/// One source deal seen through one of its tags.
#[derive(Debug, Clone, PartialEq)]
pub struct TaggedDeal<'a> {
    pub deal: &'a NormalizedDeal,
    pub tag: TagKey,
}

/// Expands every deal into one row per tag it carries.
///
/// With `include` set, only tags whose normalized form is in the set survive.
/// Deals left without tags are dropped. Rows stay grouped by source deal.
pub fn explode_by_tags<'a>(
    deals: &'a [NormalizedDeal],
    include: Option<&HashSet<String>>,
) -> Vec<TaggedDeal<'a>> {
    deals
        .iter()
        .flat_map(|deal| {
            parse_tags(&deal.deal.tags)
                .into_iter()
                .map(|display| TagKey::new(&display))
                .filter(move |tag| include.map_or(true, |allowed| allowed.contains(&tag.normalized)))
                .map(move |tag| TaggedDeal { deal, tag })
        })
        .collect()
}

/// Normalized tags present in the deals, in first-seen order.
pub fn collect_unique_tags(deals: &[NormalizedDeal]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut ordered = Vec::new();

    for deal in deals {
        for tag in parse_tags(&deal.deal.tags) {
            let normalized = normalize_text(&tag);
            if seen.insert(normalized.clone()) {
                ordered.push(normalized);
            }
        }
    }

    ordered
}

/// Distinct tags found in an export, for tag pickers.
///
/// Tags are distinct on their normalized form and keep the first spelling
/// seen; the list is sorted on the normalized form.
pub fn tag_options(deals: &[Deal]) -> Vec<String> {
    let mut options = BTreeMap::new();
    for tag in deals.iter().flat_map(|deal| parse_tags(&deal.tags)) {
        options.entry(normalize_text(&tag)).or_insert(tag);
    }
    options.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deal_with_tags(tags: &str) -> NormalizedDeal {
        NormalizedDeal::from_deal(Deal {
            stage: "Ответил".to_string(),
            funnel: "Корзина".to_string(),
            tags: tags.to_string(),
            ..Deal::default()
        })
    }

    #[test]
    fn parse_tags_unifies_separators_and_drops_blanks() {
        assert_eq!(
            parse_tags(" promo ; vip|black friday/ email\\ ,, "),
            vec!["promo", "vip", "black friday", "email"]
        );
        assert!(parse_tags("").is_empty());
        assert!(parse_tags(" ; | ").is_empty());
    }

    #[test]
    fn parse_tags_keeps_first_spelling_of_duplicates() {
        assert_eq!(parse_tags("Promo, PROMO, vip, promo"), vec!["Promo", "vip"]);
        assert_eq!(parse_tags("Ёлка, елка"), vec!["Ёлка"]);
    }

    #[test]
    fn parse_tags_is_idempotent_across_separators() {
        for raw in [
            "a;b|c/d\\e",
            "A, a ,B;b",
            "  spaced tag | other tag ",
            "single",
            "",
        ] {
            let parsed = parse_tags(raw);
            assert_eq!(parse_tags(&parsed.join(",")), parsed, "input {raw:?}");
        }
    }

    #[test]
    fn explode_emits_one_row_per_distinct_tag() {
        let deals = vec![deal_with_tags("A, B, a")];
        let rows = explode_by_tags(&deals, None);

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].tag.display, "A");
        assert_eq!(rows[0].tag.normalized, "a");
        assert_eq!(rows[1].tag.display, "B");
        assert!(rows.iter().all(|row| *row.deal == deals[0]));
    }

    #[test]
    fn explode_filters_to_included_tags_and_drops_untagged() {
        let deals = vec![
            deal_with_tags("promo, vip"),
            deal_with_tags(""),
            deal_with_tags("email"),
        ];
        let include: HashSet<String> = ["vip".to_string()].into_iter().collect();

        let rows = explode_by_tags(&deals, Some(&include));
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].tag.display, "vip");

        assert_eq!(explode_by_tags(&deals, None).len(), 3);
    }

    #[test]
    fn collect_unique_tags_preserves_first_seen_order() {
        let deals = vec![deal_with_tags("Vip, promo"), deal_with_tags("PROMO; email")];
        assert_eq!(collect_unique_tags(&deals), vec!["vip", "promo", "email"]);
    }

    #[test]
    fn tag_options_are_sorted_and_distinct() {
        let deals = vec![
            Deal {
                tags: "vip, promo".to_string(),
                ..Deal::default()
            },
            Deal {
                tags: "promo".to_string(),
                ..Deal::default()
            },
        ];
        assert_eq!(tag_options(&deals), vec!["promo", "vip"]);
    }

    #[test]
    fn tag_options_merge_spellings_across_deals() {
        let deals = vec![
            Deal {
                tags: "Promo, Ёлка".to_string(),
                ..Deal::default()
            },
            Deal {
                tags: "promo; елка; Vip".to_string(),
                ..Deal::default()
            },
        ];
        assert_eq!(tag_options(&deals), vec!["Promo", "Vip", "Ёлка"]);
    }
}
