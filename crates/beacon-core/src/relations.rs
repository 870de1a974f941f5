// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Declared "assignable to" relations between payload types.
//!
//! Rust values carry no runtime subtype information, so the bus keeps an
//! explicit table of conversions from a source type to a target type. The
//! resolver consults it when no payload element has the exact parameter type,
//! and the request dispatcher consults it when a reply is not exactly the
//! requested type.

use crate::payload::Arg;
use std::any::TypeId;
use std::collections::HashMap;
use std::rc::Rc;

type Convert = Rc<dyn Fn(&Arg) -> Option<Arg>>;

/// A table of `Sub -> Super` conversions keyed by the pair of [`TypeId`]s.
///
/// Relations are direct: declaring `A -> B` and `B -> C` does not make `A`
/// assignable to `C`.
#[derive(Default, Clone)]
pub struct TypeRelations {
    edges: HashMap<(TypeId, TypeId), Convert>,
}

impl TypeRelations {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares that a `Sub` may be bound wherever a `Super` is expected,
    /// using `convert` to produce the `Super` value.
    ///
    /// A later declaration for the same pair replaces the earlier one.
    pub fn declare<Sub, Super, F>(&mut self, convert: F)
    where
        Sub: 'static,
        Super: 'static,
        F: Fn(&Sub) -> Super + 'static,
    {
        let key = (TypeId::of::<Sub>(), TypeId::of::<Super>());
        let convert: Convert = Rc::new(move |arg: &Arg| {
            arg.downcast_ref::<Sub>().map(|sub| Arg::new(convert(sub)))
        });
        if self.edges.insert(key, convert).is_some() {
            log::debug!(
                "Replaced relation {} -> {}",
                std::any::type_name::<Sub>(),
                std::any::type_name::<Super>()
            );
        }
    }

    /// Returns `true` if a conversion from `from` to `to` has been declared.
    pub fn is_assignable(&self, from: TypeId, to: TypeId) -> bool {
        self.edges.contains_key(&(from, to))
    }

    /// Converts `arg` into a value of the type identified by `to`, if a
    /// relation exists.
    pub fn convert(&self, arg: &Arg, to: TypeId) -> Option<Arg> {
        self.edges.get(&(arg.type_id(), to)).and_then(|convert| convert(arg))
    }

    /// Number of declared relations.
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    /// Returns `true` if no relation has been declared.
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Shape {
        fn sides(&self) -> u32;
    }

    struct Square;
    impl Shape for Square {
        fn sides(&self) -> u32 {
            4
        }
    }

    #[test]
    fn declared_relation_converts() {
        let mut relations = TypeRelations::new();
        relations.declare::<Rc<Square>, Rc<dyn Shape>, _>(|s| s.clone() as Rc<dyn Shape>);

        let arg = Arg::new(Rc::new(Square));
        let target = TypeId::of::<Rc<dyn Shape>>();
        assert!(relations.is_assignable(arg.type_id(), target));

        let converted = relations.convert(&arg, target).expect("relation should apply");
        let shape = converted.downcast_ref::<Rc<dyn Shape>>().unwrap();
        assert_eq!(shape.sides(), 4);
    }

    #[test]
    fn relations_are_not_transitive() {
        let mut relations = TypeRelations::new();
        relations.declare::<u8, u16, _>(|v| u16::from(*v));
        relations.declare::<u16, u32, _>(|v| u32::from(*v));

        assert!(relations.convert(&Arg::new(1_u8), TypeId::of::<u32>()).is_none());
        assert_eq!(relations.len(), 2);
    }

    #[test]
    fn redeclaring_replaces() {
        let mut relations = TypeRelations::new();
        relations.declare::<u8, u32, _>(|v| u32::from(*v));
        relations.declare::<u8, u32, _>(|v| u32::from(*v) * 10);

        let out = relations.convert(&Arg::new(2_u8), TypeId::of::<u32>()).unwrap();
        assert_eq!(out.downcast_ref::<u32>(), Some(&20));
        assert_eq!(relations.len(), 1);
    }
}
