//! Builtin primitives: operators, data, control, events, and procedures.
//!
//! These are the opcodes the execution core itself understands; io-flavored categories (motion,
//! looks, sound, sensing) are the host's to register. Every operator here computes with the same
//! cast helpers the compiler's inlined rewrites lower to, which is what keeps interpreted and
//! compiled runs observationally identical.

use std::rc::Rc;

use blockvm_core::{
    ArgValues, BlockUtility, NamedRef, PrimitiveResult, Primitives, Value, cast,
    lookup_or_create_list, lookup_or_create_variable, opcodes,
};

// REGISTRY
// ================================================================================================

/// Returns a registry preloaded with the builtin primitives.
pub fn builtin_registry() -> Primitives {
    let mut registry = Primitives::new();
    register_operators(&mut registry);
    register_data(&mut registry);
    register_control(&mut registry);
    register_events(&mut registry);
    register_procedures(&mut registry);
    registry
}

fn value(v: Value) -> PrimitiveResult {
    PrimitiveResult::Value(v)
}

fn num(n: f64) -> PrimitiveResult {
    value(Value::Num(n))
}

fn boolean(b: bool) -> PrimitiveResult {
    value(Value::Bool(b))
}

// OPERATORS
// ================================================================================================

fn register_operators(registry: &mut Primitives) {
    registry.insert("operator_add", |args, _| num(args.num("NUM1") + args.num("NUM2")));
    registry.insert("operator_subtract", |args, _| num(args.num("NUM1") - args.num("NUM2")));
    registry.insert("operator_multiply", |args, _| num(args.num("NUM1") * args.num("NUM2")));
    registry.insert("operator_divide", |args, _| num(args.num("NUM1") / args.num("NUM2")));
    registry.insert("operator_mod", |args, _| {
        num(cast::modulo(args.num("NUM1"), args.num("NUM2")))
    });
    registry.insert("operator_round", |args, _| num(cast::round_half_up(args.num("NUM"))));
    registry.insert("operator_mathop", |args, _| {
        num(cast::mathop(&args.text("OPERATOR"), args.num("NUM")))
    });
    registry.insert("operator_lt", |args, _| {
        boolean(compare_operands(args).is_lt())
    });
    registry.insert("operator_equals", |args, _| {
        boolean(compare_operands(args).is_eq())
    });
    registry.insert("operator_gt", |args, _| {
        boolean(compare_operands(args).is_gt())
    });
    registry.insert("operator_and", |args, _| {
        boolean(args.bool("OPERAND1") && args.bool("OPERAND2"))
    });
    registry.insert("operator_or", |args, _| {
        boolean(args.bool("OPERAND1") || args.bool("OPERAND2"))
    });
    registry.insert("operator_not", |args, _| boolean(!args.bool("OPERAND")));
    registry.insert("operator_join", |args, _| {
        value(Value::from(format!("{}{}", args.text("STRING1"), args.text("STRING2"))))
    });
    registry.insert("operator_letter_of", |args, _| {
        let index = args.num("LETTER") as i64;
        let text = args.text("STRING");
        let letter = if index >= 1 {
            text.chars().nth(index as usize - 1).map(|c| c.to_string())
        } else {
            None
        };
        value(Value::from(letter.unwrap_or_default()))
    });
    registry.insert("operator_length", |args, _| {
        num(args.text("STRING").chars().count() as f64)
    });
    registry.insert("operator_contains", |args, _| {
        let haystack = args.text("STRING1").to_lowercase();
        let needle = args.text("STRING2").to_lowercase();
        boolean(haystack.contains(&needle))
    });
}

fn compare_operands(args: &ArgValues) -> std::cmp::Ordering {
    let lhs = args.get("OPERAND1").cloned().unwrap_or_default();
    let rhs = args.get("OPERAND2").cloned().unwrap_or_default();
    cast::compare(&lhs, &rhs)
}

// DATA
// ================================================================================================

fn named_arg(args: &ArgValues, key: &str) -> Option<Rc<NamedRef>> {
    match args.get(key) {
        Some(Value::Named(named)) => Some(named.clone()),
        _ => None,
    }
}

fn register_data(registry: &mut Primitives) {
    registry.insert(opcodes::DATA_VARIABLE, |args, util| {
        let Some(named) = named_arg(args, opcodes::VARIABLE_FIELD) else { return num(0.0) };
        let variable = lookup_or_create_variable(
            &util.target(),
            util.stage().as_ref(),
            &named.id,
            &named.name,
        );
        let current = variable.get().clone();
        value(current)
    });
    registry.insert(opcodes::DATA_SET_VARIABLE_TO, |args, util| {
        let Some(named) = named_arg(args, opcodes::VARIABLE_FIELD) else {
            return PrimitiveResult::Nothing;
        };
        let variable = lookup_or_create_variable(
            &util.target(),
            util.stage().as_ref(),
            &named.id,
            &named.name,
        );
        let new = args.get("VALUE").cloned().unwrap_or_default();
        variable.set(new.clone());
        if variable.is_cloud {
            util.notify_cloud_change(&variable.name.clone(), &new);
        }
        PrimitiveResult::Nothing
    });
    registry.insert(opcodes::DATA_CHANGE_VARIABLE_BY, |args, util| {
        let Some(named) = named_arg(args, opcodes::VARIABLE_FIELD) else {
            return PrimitiveResult::Nothing;
        };
        let variable = lookup_or_create_variable(
            &util.target(),
            util.stage().as_ref(),
            &named.id,
            &named.name,
        );
        let current = cast::to_number(&variable.get());
        let new = Value::Num(current + args.num("VALUE"));
        variable.set(new.clone());
        if variable.is_cloud {
            util.notify_cloud_change(&variable.name.clone(), &new);
        }
        PrimitiveResult::Nothing
    });

    registry.insert("data_addtolist", |args, util| {
        let Some(named) = named_arg(args, opcodes::LIST_FIELD) else {
            return PrimitiveResult::Nothing;
        };
        let list =
            lookup_or_create_list(&util.target(), util.stage().as_ref(), &named.id, &named.name);
        list.push(args.get("ITEM").cloned().unwrap_or_default());
        PrimitiveResult::Nothing
    });
    registry.insert("data_deletealloflist", |args, util| {
        let Some(named) = named_arg(args, opcodes::LIST_FIELD) else {
            return PrimitiveResult::Nothing;
        };
        let list =
            lookup_or_create_list(&util.target(), util.stage().as_ref(), &named.id, &named.name);
        list.items.borrow_mut().clear();
        PrimitiveResult::Nothing
    });
    registry.insert("data_deleteoflist", |args, util| {
        let Some(named) = named_arg(args, opcodes::LIST_FIELD) else {
            return PrimitiveResult::Nothing;
        };
        let list =
            lookup_or_create_list(&util.target(), util.stage().as_ref(), &named.id, &named.name);
        let index = args.num("INDEX") as i64;
        let mut items = list.items.borrow_mut();
        if index >= 1 && (index as usize) <= items.len() {
            items.remove(index as usize - 1);
        }
        PrimitiveResult::Nothing
    });
    registry.insert("data_replaceitemoflist", |args, util| {
        let Some(named) = named_arg(args, opcodes::LIST_FIELD) else {
            return PrimitiveResult::Nothing;
        };
        let list =
            lookup_or_create_list(&util.target(), util.stage().as_ref(), &named.id, &named.name);
        let index = args.num("INDEX") as i64;
        let mut items = list.items.borrow_mut();
        if index >= 1 && (index as usize) <= items.len() {
            items[index as usize - 1] = args.get("ITEM").cloned().unwrap_or_default();
        }
        PrimitiveResult::Nothing
    });
    registry.insert("data_itemoflist", |args, util| {
        let Some(named) = named_arg(args, opcodes::LIST_FIELD) else {
            return value(Value::text(""));
        };
        let list =
            lookup_or_create_list(&util.target(), util.stage().as_ref(), &named.id, &named.name);
        let index = args.num("INDEX") as i64;
        let items = list.items.borrow();
        let item = if index >= 1 && (index as usize) <= items.len() {
            items[index as usize - 1].clone()
        } else {
            Value::text("")
        };
        value(item)
    });
    registry.insert("data_lengthoflist", |args, util| {
        let Some(named) = named_arg(args, opcodes::LIST_FIELD) else { return num(0.0) };
        let list =
            lookup_or_create_list(&util.target(), util.stage().as_ref(), &named.id, &named.name);
        num(list.len() as f64)
    });
    registry.insert("data_listcontainsitem", |args, util| {
        let Some(named) = named_arg(args, opcodes::LIST_FIELD) else { return boolean(false) };
        let list =
            lookup_or_create_list(&util.target(), util.stage().as_ref(), &named.id, &named.name);
        let needle = args.get("ITEM").cloned().unwrap_or_default();
        let found =
            list.items.borrow().iter().any(|item| cast::compare(item, &needle).is_eq());
        boolean(found)
    });
}

// CONTROL
// ================================================================================================

fn register_control(registry: &mut Primitives) {
    registry.insert("control_forever", |_, util| {
        if !util.in_warp_mode() {
            util.request_redraw();
        }
        util.start_branch(1, true);
        PrimitiveResult::Nothing
    });
    registry.insert("control_repeat", |args, util| {
        let remaining = match util.frame_slot("loopCounter") {
            Some(counter) => cast::to_number(&counter),
            None => cast::round_half_up(args.num("TIMES")),
        };
        if remaining > 0.0 {
            util.set_frame_slot("loopCounter", Value::Num(remaining - 1.0));
            if !util.in_warp_mode() {
                util.request_redraw();
            }
            util.start_branch(1, true);
        }
        PrimitiveResult::Nothing
    });
    registry.insert("control_repeat_until", |args, util| {
        if !args.bool("CONDITION") {
            if !util.in_warp_mode() {
                util.request_redraw();
            }
            util.start_branch(1, true);
        }
        PrimitiveResult::Nothing
    });
    registry.insert("control_while", |args, util| {
        if args.bool("CONDITION") {
            util.start_branch(1, true);
        }
        PrimitiveResult::Nothing
    });
    registry.insert("control_if", |args, util| {
        if args.bool("CONDITION") {
            util.start_branch(1, false);
        }
        PrimitiveResult::Nothing
    });
    registry.insert("control_if_else", |args, util| {
        if args.bool("CONDITION") {
            util.start_branch(1, false);
        } else {
            util.start_branch(2, false);
        }
        PrimitiveResult::Nothing
    });
    registry.insert("control_wait", |args, util| {
        let ms = 1000.0 * args.num("DURATION");
        PrimitiveResult::Promise(util.start_timer_promise(ms))
    });
    registry.insert("control_stop", |args, util| {
        match args.text("STOP_OPTION").as_str() {
            "this script" => util.stop_this_script(),
            _ => util.retire(),
        }
        PrimitiveResult::Nothing
    });
}

// EVENTS
// ================================================================================================

fn register_events(registry: &mut Primitives) {
    registry.insert_hat("event_whenflagclicked", false, |_, _| PrimitiveResult::Nothing);
    registry.insert_hat("event_whenbroadcastreceived", false, |_, _| PrimitiveResult::Nothing);
    registry.insert_hat("event_whenkeypressed", true, |args, util| {
        let key = args.text("KEY_OPTION");
        let pressed = util.io_query("keyboard", "is_key_pressed", &[Value::from(key)]);
        value(Value::Bool(cast::to_boolean(&pressed)))
    });
}

// PROCEDURES
// ================================================================================================

fn register_procedures(registry: &mut Primitives) {
    registry.insert(opcodes::PROCEDURES_DEFINITION, |_, _| PrimitiveResult::Nothing);
    registry.insert(opcodes::PROCEDURES_CALL, |args, util| {
        let Some(mutation) = args.mutation.clone() else { return PrimitiveResult::Nothing };
        let Some(proccode) = mutation.proccode.clone() else { return PrimitiveResult::Nothing };
        let Some(params) = util.get_procedure_params(&proccode) else {
            return PrimitiveResult::Nothing;
        };

        util.init_params();
        for (position, id) in params.ids.iter().enumerate() {
            let name = params.names.get(position).cloned().unwrap_or_else(|| id.clone());
            let bound = args
                .get(id)
                .cloned()
                .or_else(|| params.defaults.get(position).cloned())
                .unwrap_or_default();
            util.push_param(&name, bound);
        }
        util.start_procedure(&proccode, mutation.warp);
        PrimitiveResult::Nothing
    });
    registry.insert(opcodes::ARGUMENT_REPORTER_STRING_NUMBER, |args, util| {
        value(util.get_param(&args.text("VALUE")))
    });
    registry.insert(opcodes::ARGUMENT_REPORTER_BOOLEAN, |args, util| {
        value(util.get_param(&args.text("VALUE")))
    });
}
