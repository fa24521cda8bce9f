use std::collections::HashSet;

use crate::models::Tag;
use crate::slug::slugify;

/// Keeps the first tag seen for each slug, in input order.
pub fn distinct_by_slug<I>(tags: I) -> Vec<Tag>
where
    I: IntoIterator<Item = Tag>,
{
    let mut seen = HashSet::new();
    tags.into_iter()
        .filter(|t| seen.insert(t.slug.clone()))
        .collect()
}

/// Parses `"news, tech,outdoors"` into tags, dropping blanks and
/// duplicates.
pub fn parse_comma_tags(input: &str) -> Vec<Tag> {
    distinct_by_slug(
        input
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .filter_map(|name| {
                let slug = slugify(name);
                (!slug.is_empty()).then(|| Tag::new(name, slug))
            }),
    )
}

pub fn join_names(tags: &[Tag]) -> String {
    tags.iter().map(|t| t.name.as_str()).collect::<Vec<_>>().join(", ")
}
