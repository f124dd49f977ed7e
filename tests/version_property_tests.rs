//! Property-based tests for version parsing, ordering and constraints
//!
//! Uses proptest to verify invariants that should hold for all inputs.

use modsys::{Version, VersionConstraint};
use proptest::prelude::*;

/// Versions over a small component space so probes collide with bounds often
fn version_strategy() -> impl Strategy<Value = Version> {
    (
        0u64..20,
        0u64..20,
        0u64..20,
        0u64..4,
        proptest::option::of("[a-z][a-z0-9]{0,4}"),
    )
        .prop_map(|(major, minor, micro, update, qualifier)| {
            let version = Version::new(major, minor, micro).with_update(update);
            match qualifier {
                Some(q) => version.with_qualifier(q),
                None => version,
            }
        })
}

fn constraint_strategy() -> impl Strategy<Value = VersionConstraint> {
    prop_oneof![
        version_strategy().prop_map(VersionConstraint::Exact),
        version_strategy().prop_map(VersionConstraint::AtLeast),
        (
            version_strategy(),
            version_strategy(),
            any::<bool>(),
            any::<bool>()
        )
            .prop_map(|(a, b, lower_inclusive, upper_inclusive)| {
                let (lower, upper) = if a <= b { (a, b) } else { (b, a) };
                VersionConstraint::Range {
                    lower,
                    lower_inclusive,
                    upper,
                    upper_inclusive,
                }
            }),
    ]
}

/// Property: Version display and parse round-trip losslessly
proptest! {
    #[test]
    fn prop_version_display_parse_round_trip(version in version_strategy()) {
        let text = version.to_string();
        let reparsed: Version = text.parse().unwrap();
        prop_assert_eq!(&reparsed, &version);
        prop_assert_eq!(reparsed.to_string(), text);
    }
}

/// Property: Ordering of release versions matches their component tuples
proptest! {
    #[test]
    fn prop_release_ordering_is_component_wise(
        a in (0u64..20, 0u64..20, 0u64..20, 0u64..4),
        b in (0u64..20, 0u64..20, 0u64..20, 0u64..4),
    ) {
        let left = Version::new(a.0, a.1, a.2).with_update(a.3);
        let right = Version::new(b.0, b.1, b.2).with_update(b.3);
        prop_assert_eq!(left.cmp(&right), a.cmp(&b));
    }
}

/// Property: A release outranks every one of its own pre-releases
proptest! {
    #[test]
    fn prop_release_outranks_prerelease(
        components in (0u64..20, 0u64..20, 0u64..20),
        qualifier in "[a-z][a-z0-9]{0,4}",
    ) {
        let release = Version::new(components.0, components.1, components.2);
        let prerelease = release.clone().with_qualifier(qualifier);
        prop_assert!(release > prerelease);
    }
}

/// Property: An open lower bound contains exactly the versions at or above it
proptest! {
    #[test]
    fn prop_atleast_contains_iff_not_below(
        bound in version_strategy(),
        probe in version_strategy(),
    ) {
        let constraint = VersionConstraint::AtLeast(bound.clone());
        prop_assert_eq!(constraint.contains(&probe), probe >= bound);
    }
}

/// Property: A closed-open range contains exactly [lower, upper)
proptest! {
    #[test]
    fn prop_range_membership_matches_bounds(
        a in version_strategy(),
        b in version_strategy(),
        probe in version_strategy(),
    ) {
        let (lower, upper) = if a <= b { (a, b) } else { (b, a) };
        let range = VersionConstraint::range(lower.clone(), upper.clone()).unwrap();
        prop_assert_eq!(range.contains(&probe), probe >= lower && probe < upper);
    }
}

/// Property: Intersection membership equals membership in both operands
proptest! {
    #[test]
    fn prop_intersect_preserves_membership(
        c1 in constraint_strategy(),
        c2 in constraint_strategy(),
        probe in version_strategy(),
    ) {
        let both = c1.contains(&probe) && c2.contains(&probe);
        let intersected = c1
            .intersect(&c2)
            .map_or(false, |i| i.contains(&probe));
        prop_assert_eq!(intersected, both);
    }
}

/// Property: Constraint display and parse round-trip losslessly
proptest! {
    #[test]
    fn prop_constraint_display_parse_round_trip(constraint in constraint_strategy()) {
        let text = constraint.to_string();
        let reparsed: VersionConstraint = text.parse().unwrap();
        prop_assert_eq!(reparsed, constraint);
    }
}
