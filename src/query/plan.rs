//! Index selection for a `where` triple pattern. See `spec.md` §4.7: "any
//! `?` is unbound; `(p)` bound ⇒ `post`; `(s,p)` ⇒ `spot`; `(o,p)` on a
//! reference ⇒ `opst`; default `spot`".
//!
//! Grounded on the teacher's `scans.rs`, which picks a `robt` scan shape
//! from the bound/unbound positions of a lookup key rather than always
//! walking the primary index.

use crate::comparator::Index;

use super::ast::{PatternTerm, WherePattern};

fn is_bound(term: &PatternTerm) -> bool {
    !term.is_var()
}

/// Picks the index whose leading fields best match this pattern's bound
/// positions. `o_is_ref` is the predicate's declared `ref_` flag — `opst`
/// only ever holds reference-valued flakes.
pub fn choose_index(pattern: &WherePattern, o_is_ref: bool) -> Index {
    let s_bound = is_bound(&pattern.s);
    let p_bound = is_bound(&pattern.p);
    let o_bound = is_bound(&pattern.o);

    if s_bound {
        // spot leads with s, so any pattern that pins the subject (alone or
        // together with p/o) scans a single contiguous slice under it.
        Index::Spot
    } else if p_bound && o_bound && o_is_ref {
        Index::Opst
    } else if p_bound {
        Index::Post
    } else {
        Index::Spot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::ast::PatternTerm;

    fn pattern(s: PatternTerm, p: PatternTerm, o: PatternTerm) -> WherePattern {
        WherePattern { s, p, o }
    }

    #[test]
    fn bound_subject_picks_spot() {
        let pat = pattern(
            PatternTerm::Sid(1),
            PatternTerm::Var("p".into()),
            PatternTerm::Var("o".into()),
        );
        assert_eq!(choose_index(&pat, false), Index::Spot);
    }

    #[test]
    fn bound_predicate_alone_picks_post() {
        let pat = pattern(
            PatternTerm::Var("s".into()),
            PatternTerm::Iri("ex/friend".into()),
            PatternTerm::Var("o".into()),
        );
        assert_eq!(choose_index(&pat, false), Index::Post);
    }

    #[test]
    fn bound_predicate_and_reference_object_picks_opst() {
        let pat = pattern(
            PatternTerm::Var("s".into()),
            PatternTerm::Iri("ex/friend".into()),
            PatternTerm::Sid(9),
        );
        assert_eq!(choose_index(&pat, true), Index::Opst);
    }

    #[test]
    fn fully_unbound_pattern_defaults_to_spot() {
        let pat = pattern(
            PatternTerm::Var("s".into()),
            PatternTerm::Var("p".into()),
            PatternTerm::Var("o".into()),
        );
        assert_eq!(choose_index(&pat, false), Index::Spot);
    }
}
