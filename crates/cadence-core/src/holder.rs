// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Boundary to the world object tree that owns schedulers.
//!
//! The engine never owns holders. A [`Scheduler`] keeps a `Weak` back-reference
//! to its holder and only uses it to find the registry and to hand the holder
//! to executing tasks.

use std::any::Any;
use std::rc::Rc;

use crate::class::HolderClass;
use crate::error::OperationError;
use crate::registry::SchedulerRegistry;
use crate::scheduler::Scheduler;

/// A node of the simulated object tree that may own schedulers.
///
/// Only [`Holder::holder_class`] is mandatory; the remaining methods default to
/// "no registry", "no schedulers", "no children" and "no operations".
pub trait Holder: Any {
    /// Runtime class tag used for template resolution.
    fn holder_class(&self) -> &'static HolderClass;

    /// Registry that schedulers owned by this holder register into.
    ///
    /// `None` means registration is skipped silently.
    fn scheduler_registry(&self) -> Option<Rc<SchedulerRegistry>> {
        None
    }

    /// Every scheduler slot currently populated on this holder.
    fn schedulers(&self) -> Vec<Rc<Scheduler>> {
        Vec::new()
    }

    /// Direct children in the object tree.
    fn children(&self) -> Vec<Rc<dyn Holder>> {
        Vec::new()
    }

    /// Runs the named operation on this holder.
    ///
    /// Function-call tasks dispatch through this method.
    fn invoke(&self, operation: &str) -> anyhow::Result<()> {
        Err(OperationError::Unknown {
            class: self.holder_class().name(),
            operation: operation.to_owned(),
        }
        .into())
    }
}

/// Recovers the concrete holder type inside a task body.
pub fn downcast_holder<T: Holder>(holder: &dyn Holder) -> Option<&T> {
    let any: &dyn Any = holder;
    any.downcast_ref::<T>()
}

/// Visits `root` and every descendant in depth-first pre-order.
///
/// Uses an explicit stack so deep trees cannot overflow the call stack.
pub fn walk_tree(root: &Rc<dyn Holder>, mut visit: impl FnMut(&Rc<dyn Holder>)) {
    let mut stack = vec![Rc::clone(root)];
    while let Some(node) = stack.pop() {
        visit(&node);
        let mut children = node.children();
        children.reverse();
        stack.extend(children);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    static NODE: HolderClass = HolderClass::root("Node");

    struct Node {
        label: &'static str,
        children: Vec<Rc<dyn Holder>>,
    }

    impl Holder for Node {
        fn holder_class(&self) -> &'static HolderClass {
            &NODE
        }

        fn children(&self) -> Vec<Rc<dyn Holder>> {
            self.children.clone()
        }
    }

    fn leaf(label: &'static str) -> Rc<dyn Holder> {
        Rc::new(Node {
            label,
            children: Vec::new(),
        })
    }

    #[test]
    fn walk_is_depth_first_pre_order() {
        let a: Rc<dyn Holder> = Rc::new(Node {
            label: "a",
            children: vec![leaf("a1"), leaf("a2")],
        });
        let root: Rc<dyn Holder> = Rc::new(Node {
            label: "root",
            children: vec![a, leaf("b")],
        });

        let mut seen = Vec::new();
        walk_tree(&root, |node| {
            seen.push(downcast_holder::<Node>(node.as_ref()).unwrap().label);
        });
        assert_eq!(seen, vec!["root", "a", "a1", "a2", "b"]);
    }

    #[test]
    fn default_invoke_reports_unknown_operation() {
        let node = leaf("x");
        let err = node.invoke("explode").unwrap_err();
        let op = err.downcast_ref::<OperationError>().unwrap();
        assert_eq!(
            op,
            &OperationError::Unknown {
                class: "Node",
                operation: "explode".into(),
            }
        );
    }

    #[test]
    fn downcast_rejects_other_types() {
        struct Other;
        impl Holder for Other {
            fn holder_class(&self) -> &'static HolderClass {
                &NODE
            }
        }
        let other = Other;
        assert!(downcast_holder::<Node>(&other).is_none());
    }
}
