use devhub::domain::errors::DependencyError;
use devhub::domain::models::ServiceSpec;
use devhub::services::DependencyResolver;
use proptest::prelude::*;
use std::collections::{HashMap, HashSet};

fn name(i: usize) -> String {
    format!("svc{i:02}")
}

/// An acyclic graph: service `i` may only need services with a lower index.
fn acyclic_graph() -> impl Strategy<Value = Vec<ServiceSpec>> {
    (1usize..16)
        .prop_flat_map(|size| {
            (
                Just(size),
                prop::collection::vec((0..size, 0..size), 0..size * 2),
            )
        })
        .prop_map(|(size, edges)| {
            let mut needs: Vec<Vec<String>> = vec![Vec::new(); size];
            for (a, b) in edges {
                let (from, to) = if a > b { (a, b) } else { (b, a) };
                if from != to && !needs[from].contains(&name(to)) {
                    needs[from].push(name(to));
                }
            }
            needs
                .into_iter()
                .enumerate()
                .map(|(i, needs)| ServiceSpec::new(name(i), "run").with_needs(needs))
                .collect()
        })
}

proptest! {
    /// Property: every service appears exactly once, after everything it needs
    #[test]
    fn prop_start_order_respects_needs(specs in acyclic_graph()) {
        let resolver = DependencyResolver::new(&specs);
        let order = resolver.start_order().unwrap();

        prop_assert_eq!(order.len(), specs.len());
        let position: HashMap<&str, usize> =
            order.iter().enumerate().map(|(i, n)| (n.as_str(), i)).collect();
        prop_assert_eq!(position.len(), specs.len());
        let declared: HashSet<&str> = resolver.names().collect();
        prop_assert!(position.keys().all(|name| declared.contains(name)));

        for spec in &specs {
            for need in &spec.needs {
                prop_assert!(
                    position[need.as_str()] < position[spec.name.as_str()],
                    "{} started before its dependency {}", spec.name, need
                );
            }
        }
    }

    /// Property: identical input always yields the identical order
    #[test]
    fn prop_start_order_is_deterministic(specs in acyclic_graph()) {
        let mut reversed = specs.clone();
        reversed.reverse();

        let a = DependencyResolver::new(&specs).start_order().unwrap();
        let b = DependencyResolver::new(&reversed).start_order().unwrap();
        prop_assert_eq!(a, b);
    }

    /// Property: the dependency closure is exactly the transitive needs, in a
    /// startable order
    #[test]
    fn prop_dependency_closure_is_transitive(specs in acyclic_graph(), pick in any::<prop::sample::Index>()) {
        let resolver = DependencyResolver::new(&specs);
        let target = &specs[pick.index(specs.len())].name;
        let closure = resolver.dependency_closure(target);

        let mut expected = HashSet::new();
        let mut pending = vec![target.clone()];
        while let Some(node) = pending.pop() {
            for need in resolver.needs(&node) {
                if expected.insert(need.clone()) {
                    pending.push(need.clone());
                }
            }
        }

        let actual: HashSet<String> = closure.iter().cloned().collect();
        prop_assert_eq!(actual.len(), closure.len());
        prop_assert_eq!(&actual, &expected);
        prop_assert!(!actual.contains(target));

        for (i, service) in closure.iter().enumerate() {
            for need in resolver.needs(service) {
                let at = closure.iter().position(|n| n == need).unwrap();
                prop_assert!(at < i);
            }
        }
    }

    /// Property: transitive dependents are exactly the services whose closure
    /// contains the target
    #[test]
    fn prop_transitive_dependents_mirror_closure(specs in acyclic_graph(), pick in any::<prop::sample::Index>()) {
        let resolver = DependencyResolver::new(&specs);
        let target = &specs[pick.index(specs.len())].name;

        let dependents: HashSet<String> =
            resolver.transitive_dependents(target).into_iter().collect();
        let expected: HashSet<String> = specs
            .iter()
            .filter(|s| resolver.dependency_closure(&s.name).contains(target))
            .map(|s| s.name.clone())
            .collect();

        prop_assert_eq!(dependents, expected);
    }

    /// Property: closing any path back onto itself is reported as a cycle
    #[test]
    fn prop_back_edge_is_a_cycle(size in 2usize..12) {
        // chain: svc01 needs svc00, svc02 needs svc01, ...; then svc00 needs the last
        let mut specs: Vec<ServiceSpec> = (0..size)
            .map(|i| {
                let spec = ServiceSpec::new(name(i), "run");
                if i == 0 { spec.with_needs([name(size - 1)]) } else { spec.with_needs([name(i - 1)]) }
            })
            .collect();
        specs.reverse();

        let err = DependencyResolver::new(&specs).start_order().unwrap_err();
        let is_cycle = matches!(err, DependencyError::Cycle { .. });
        prop_assert!(is_cycle);
    }
}

#[test]
fn test_missing_dependency_is_reported() {
    let specs = vec![
        ServiceSpec::new("api", "run").with_needs(["db"]),
        ServiceSpec::new("web", "run").with_needs(["api"]),
    ];

    let err = DependencyResolver::new(&specs).start_order().unwrap_err();
    assert_eq!(
        err,
        DependencyError::MissingDependency {
            service: "api".to_string(),
            dependency: "db".to_string(),
        }
    );
}
