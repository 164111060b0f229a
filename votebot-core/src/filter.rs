//! Author/keyword candidate selection.

use crate::types::{Comment, Post};
use std::collections::HashSet;

/// Anything with an author and a text body the filter can inspect.
pub trait Authored {
    fn author(&self) -> &str;
    fn body(&self) -> &str;
}

impl Authored for Post {
    fn author(&self) -> &str {
        &self.author
    }

    fn body(&self) -> &str {
        &self.body
    }
}

impl Authored for Comment {
    fn author(&self) -> &str {
        &self.author
    }

    fn body(&self) -> &str {
        &self.body
    }
}

/// True when `item`'s author is in `allowed_authors` and its body contains
/// `keyword`, ignoring case. An empty keyword matches every body.
pub fn is_candidate<T: Authored>(item: &T, keyword: &str, allowed_authors: &HashSet<String>) -> bool {
    allowed_authors.contains(item.author())
        && item.body().to_lowercase().contains(&keyword.to_lowercase())
}

/// Keeps the items passing [`is_candidate`], in their original order.
pub fn select_candidates<'a, T: Authored>(
    items: &'a [T],
    keyword: &str,
    allowed_authors: &HashSet<String>,
) -> Vec<&'a T> {
    items
        .iter()
        .filter(|item| is_candidate(*item, keyword, allowed_authors))
        .collect()
}

/// Uniformly picks one candidate, or `None` when there are none.
pub fn choose_candidate<'a, T>(candidates: &[&'a T], rng: &mut fastrand::Rng) -> Option<&'a T> {
    if candidates.is_empty() {
        return None;
    }
    Some(candidates[rng.usize(..candidates.len())])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn comment(id: &str, author: &str, body: &str) -> Comment {
        Comment {
            id: id.to_string(),
            full_id: format!("t1_{}", id),
            author: author.to_string(),
            body: body.to_string(),
            likes: None,
        }
    }

    fn allow(names: &[&str]) -> HashSet<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_keyword_match_ignores_case() {
        let items = vec![
            comment("a", "alice", "I love Golang"),
            comment("b", "bob", "golang too"),
        ];

        let selected = select_candidates(&items, "golang", &allow(&["alice"]));
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].id, "a");
    }

    #[test]
    fn test_author_match_is_exact() {
        let items = vec![comment("a", "Alice", "golang")];
        assert!(select_candidates(&items, "golang", &allow(&["alice"])).is_empty());
    }

    #[test]
    fn test_order_is_preserved() {
        let items = vec![
            comment("1", "alice", "rust and GOLANG"),
            comment("2", "carol", "nothing here"),
            comment("3", "dani", "golang!"),
            comment("4", "alice", "more golang"),
        ];

        let ids: Vec<&str> = select_candidates(&items, "GoLang", &allow(&["alice", "dani"]))
            .into_iter()
            .map(|c| c.id.as_str())
            .collect();
        assert_eq!(ids, vec!["1", "3", "4"]);
    }

    #[test]
    fn test_empty_keyword_matches_any_body() {
        let items = vec![comment("a", "alice", ""), comment("b", "alice", "text")];
        assert_eq!(select_candidates(&items, "", &allow(&["alice"])).len(), 2);
    }

    #[test]
    fn test_empty_allow_set_selects_nothing() {
        let items = vec![comment("a", "alice", "golang")];
        assert!(select_candidates(&items, "golang", &HashSet::new()).is_empty());
    }

    #[test]
    fn test_choose_candidate_is_reproducible_with_seed() {
        let items = vec![
            comment("1", "alice", "golang"),
            comment("2", "alice", "golang"),
            comment("3", "alice", "golang"),
        ];
        let candidates: Vec<&Comment> = items.iter().collect();

        let first = choose_candidate(&candidates, &mut fastrand::Rng::with_seed(7)).map(|c| c.id.clone());
        let second = choose_candidate(&candidates, &mut fastrand::Rng::with_seed(7)).map(|c| c.id.clone());
        assert_eq!(first, second);
        assert!(first.is_some());
    }

    #[test]
    fn test_choose_candidate_empty() {
        let candidates: Vec<&Comment> = Vec::new();
        assert!(choose_candidate(&candidates, &mut fastrand::Rng::with_seed(1)).is_none());
    }
}
