//! Edge-activated hat behavior.

use std::cell::Cell;
use std::rc::Rc;

use blockvm_core::{Block, Value, testing::TestBlocks};

use super::fixtures::*;
use crate::runtime::IoHandler;
use crate::Runtime;

struct Keyboard {
    pressed: Rc<Cell<bool>>,
}

impl IoHandler for Keyboard {
    fn query(&mut self, service: &str, method: &str, _args: &[Value]) -> Value {
        if service == "keyboard" && method == "is_key_pressed" {
            Value::Bool(self.pressed.get())
        } else {
            Value::default()
        }
    }
}

fn key_hat_blocks() -> TestBlocks {
    let mut blocks = TestBlocks::new();
    blocks.add(
        Block::new("hat", "event_whenkeypressed")
            .with_field("KEY_OPTION", "space")
            .with_next("chg"),
    );
    blocks.add(
        Block::new("chg", "data_changevariableby")
            .with_ref_field("VARIABLE", "varc", "count")
            .with_shadow_input("VALUE", "one"),
    );
    shadow_num(&mut blocks, "one", "1");
    blocks.add_script("hat");
    blocks
}

#[test]
fn edge_activated_hats_fire_only_on_a_false_to_true_transition() {
    let pressed = Rc::new(Cell::new(true));
    let registry = Rc::new(TracedRegistry::new());
    let mut rt = Runtime::new(registry);
    rt.set_io_handler(Box::new(Keyboard { pressed: pressed.clone() }));

    let target = sprite();
    let cid = rt.register_container(Rc::new(key_hat_blocks()), target.clone());

    // First true reading: a transition from the initial false, so the script body runs.
    rt.start_edge_activated_hats();
    run_to_completion(&mut rt);
    assert_eq!(variable_number(&target, "varc"), 1.0);

    // Second true reading: no transition, the thread retires at the hat report.
    rt.start_edge_activated_hats();
    run_to_completion(&mut rt);
    assert_eq!(variable_number(&target, "varc"), 1.0);

    // Release, then press again: the next reading is a fresh transition.
    pressed.set(false);
    rt.start_edge_activated_hats();
    run_to_completion(&mut rt);
    assert_eq!(variable_number(&target, "varc"), 1.0);

    pressed.set(true);
    rt.start_edge_activated_hats();
    run_to_completion(&mut rt);
    assert_eq!(variable_number(&target, "varc"), 2.0);
}
