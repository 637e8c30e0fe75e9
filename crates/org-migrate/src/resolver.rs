//! Dependency ordering for import tasks.
//!
//! Export order is flat; import has to respect foreign keys, so the task
//! list is expanded depth-first from each root's dependency declaration.
//! The graph is declared statically and small, so a depth ceiling stands
//! in for full cycle detection: a well-formed graph never gets near it,
//! and a cyclic one trips it with a named task instead of overflowing the
//! stack.

use std::fmt::Display;

use crate::error::{MigrateError, Result};

/// Levels of dependency nesting allowed before the graph is declared
/// cyclic.
pub const MAX_DEPTH: usize = 100;

/// Expand `roots` into a duplicate-free order where every task appears
/// after all of its dependencies. `deps_fn` maps a task to its direct
/// dependencies.
pub fn resolve_order<T, F>(roots: &[T], deps_fn: F) -> Result<Vec<T>>
where
    T: Copy + Eq + Display,
    F: Fn(T) -> Vec<T>,
{
    let mut ordered = Vec::new();
    for &root in roots {
        visit(root, &deps_fn, &mut ordered, 0)?;
    }
    Ok(ordered)
}

fn visit<T, F>(task: T, deps_fn: &F, ordered: &mut Vec<T>, depth: usize) -> Result<()>
where
    T: Copy + Eq + Display,
    F: Fn(T) -> Vec<T>,
{
    if depth > MAX_DEPTH {
        return Err(MigrateError::DependencyDepth {
            task: task.to_string(),
            limit: MAX_DEPTH,
        });
    }

    if ordered.contains(&task) {
        return Ok(());
    }

    for dep in deps_fn(task) {
        visit(dep, deps_fn, ordered, depth + 1)?;
    }

    // Deps may have pulled this task in while recursing.
    if !ordered.contains(&task) {
        ordered.push(task);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::ManagerKind;

    fn position(order: &[ManagerKind], kind: ManagerKind) -> usize {
        order.iter().position(|k| *k == kind).unwrap()
    }

    #[test]
    fn test_dependencies_precede_dependents() {
        let order = resolve_order(&ManagerKind::ALL, |k| k.depends_on().to_vec()).unwrap();
        assert_eq!(order.len(), ManagerKind::ALL.len());

        for kind in ManagerKind::ALL {
            for dep in kind.depends_on() {
                assert!(
                    position(&order, *dep) < position(&order, kind),
                    "{} must come before {}",
                    dep,
                    kind
                );
            }
        }
    }

    #[test]
    fn test_owner_first() {
        let order = resolve_order(&ManagerKind::ALL, |k| k.depends_on().to_vec()).unwrap();
        assert_eq!(order[0], ManagerKind::Owner);
    }

    #[test]
    fn test_diamond_dependency_appears_once() {
        // Pool and ActivationKey both pull in Product; it must only be
        // scheduled once.
        let order = resolve_order(
            &[ManagerKind::Pool, ManagerKind::ActivationKey],
            |k| k.depends_on().to_vec(),
        )
        .unwrap();
        let products = order
            .iter()
            .filter(|k| **k == ManagerKind::Product)
            .count();
        assert_eq!(products, 1);
    }

    #[test]
    fn test_cycle_trips_depth_ceiling() {
        #[derive(Clone, Copy, PartialEq, Eq)]
        enum Node {
            A,
            B,
        }
        impl std::fmt::Display for Node {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(match self {
                    Node::A => "a",
                    Node::B => "b",
                })
            }
        }

        let result = resolve_order(&[Node::A], |n| match n {
            Node::A => vec![Node::B],
            Node::B => vec![Node::A],
        });
        assert!(matches!(
            result,
            Err(MigrateError::DependencyDepth { limit: MAX_DEPTH, .. })
        ));
    }
}
