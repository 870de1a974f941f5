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

//! Binding of payload elements to declared handler parameters.
//!
//! For each value parameter, in declaration order, the resolver takes the
//! first unused payload element of exactly the declared type. Failing that,
//! it takes the first unused element that has a declared relation to the
//! parameter type, converting it. An element binds to at most one parameter.
//! A trailing [`Rest`] parameter receives the whole payload untouched.

use crate::error::DispatchFault;
use crate::handler::ParamSpec;
use crate::payload::{Arg, Payload, Rest};
use crate::relations::TypeRelations;

/// Binds `payload` to `params`, returning one argument per parameter.
///
/// # Errors
///
/// Returns [`DispatchFault::Unresolved`] for the first parameter that no
/// remaining payload element can satisfy.
pub(crate) fn bind(
    params: &[ParamSpec],
    payload: &Payload,
    relations: &TypeRelations,
) -> Result<Vec<Arg>, DispatchFault> {
    let elements = payload.as_slice();
    let mut used = vec![false; elements.len()];
    let mut bound = Vec::with_capacity(params.len());

    for (position, param) in params.iter().enumerate() {
        if param.rest {
            bound.push(Arg::new(Rest(payload.clone())));
            continue;
        }

        let exact = elements
            .iter()
            .enumerate()
            .find(|(i, arg)| !used[*i] && arg.type_id() == param.type_id)
            .map(|(i, arg)| (i, arg.clone()));

        let found = exact.or_else(|| {
            elements.iter().enumerate().find_map(|(i, arg)| {
                if used[i] {
                    return None;
                }
                relations.convert(arg, param.type_id).map(|converted| (i, converted))
            })
        });

        match found {
            Some((index, arg)) => {
                used[index] = true;
                bound.push(arg);
            }
            None => {
                return Err(DispatchFault::Unresolved {
                    position,
                    type_name: param.type_name,
                })
            }
        }
    }

    Ok(bound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload;
    use std::rc::Rc;

    trait Creature {
        fn name(&self) -> &str;
    }

    struct Goblin;
    impl Creature for Goblin {
        fn name(&self) -> &str {
            "goblin"
        }
    }

    struct Dragon;
    impl Creature for Dragon {
        fn name(&self) -> &str {
            "dragon"
        }
    }

    fn creature_relations() -> TypeRelations {
        let mut relations = TypeRelations::new();
        relations.declare::<Rc<Goblin>, Rc<dyn Creature>, _>(|g| g.clone() as Rc<dyn Creature>);
        relations.declare::<Rc<Dragon>, Rc<dyn Creature>, _>(|d| d.clone() as Rc<dyn Creature>);
        relations
    }

    #[test]
    fn exact_match_binds_in_order() {
        let params = [ParamSpec::of::<i32>(), ParamSpec::of::<String>()];
        let payload = payload![String::from("a"), 5_i32];
        let args = bind(&params, &payload, &TypeRelations::new()).unwrap();
        assert_eq!(args[0].downcast_ref::<i32>(), Some(&5));
        assert_eq!(args[1].downcast_ref::<String>().unwrap(), "a");
    }

    #[test]
    fn exact_type_wins_over_earlier_assignable_element() {
        let relations = creature_relations();
        let params = [ParamSpec::of::<Rc<dyn Creature>>()];
        let exact: Rc<dyn Creature> = Rc::new(Dragon);
        let payload = payload![Rc::new(Goblin), exact];

        let args = bind(&params, &payload, &relations).unwrap();
        let creature = args[0].downcast_ref::<Rc<dyn Creature>>().unwrap();
        assert_eq!(creature.name(), "dragon");
    }

    #[test]
    fn assignable_element_is_used_as_fallback() {
        let relations = creature_relations();
        let params = [ParamSpec::of::<Rc<dyn Creature>>()];
        let payload = payload![7_u8, Rc::new(Goblin)];

        let args = bind(&params, &payload, &relations).unwrap();
        let creature = args[0].downcast_ref::<Rc<dyn Creature>>().unwrap();
        assert_eq!(creature.name(), "goblin");
    }

    #[test]
    fn elements_are_consumed_once() {
        let params = [ParamSpec::of::<i32>(), ParamSpec::of::<i32>()];
        let payload = payload![1_i32, 2_i32];
        let args = bind(&params, &payload, &TypeRelations::new()).unwrap();
        assert_eq!(args[0].downcast_ref::<i32>(), Some(&1));
        assert_eq!(args[1].downcast_ref::<i32>(), Some(&2));

        let single = payload![1_i32];
        match bind(&params, &single, &TypeRelations::new()) {
            Err(DispatchFault::Unresolved { position, type_name }) => {
                assert_eq!(position, 1);
                assert_eq!(type_name, "i32");
            }
            other => panic!("expected unresolved second parameter, got {other:?}"),
        }
    }

    #[test]
    fn rest_receives_full_payload() {
        let params = [ParamSpec::of::<i32>(), ParamSpec::of::<Rest>()];
        let payload = payload![3_i32, "x", 4.5_f64];
        let args = bind(&params, &payload, &TypeRelations::new()).unwrap();
        let rest = args[1].downcast_ref::<Rest>().unwrap();
        assert_eq!(rest.len(), 3);
        assert_eq!(rest.find::<i32>(), Some(&3));
    }

    #[test]
    fn rest_accepts_empty_payload() {
        let params = [ParamSpec::of::<Rest>()];
        let args = bind(&params, &Payload::new(), &TypeRelations::new()).unwrap();
        assert!(args[0].downcast_ref::<Rest>().unwrap().is_empty());
    }

    #[test]
    fn missing_type_is_unresolved() {
        let params = [ParamSpec::of::<u64>()];
        let err = bind(&params, &payload![1_i32], &TypeRelations::new()).unwrap_err();
        assert!(err.to_string().contains("u64"));
    }
}
