//! Reserved opcode names.
//!
//! The `vm_*` opcodes are synthesized by the block cache and never appear in authored graphs;
//! the remaining constants are the author-visible opcodes the cache and the compiler treat
//! specially.

// SYNTHETIC OPCODES
// ================================================================================================

pub const VM_END_OF_THREAD: &str = "vm_end_of_thread";
pub const VM_END_OF_PROCEDURE: &str = "vm_end_of_procedure";
pub const VM_END_OF_LOOP_BRANCH: &str = "vm_end_of_loop_branch";
pub const VM_END_OF_BRANCH: &str = "vm_end_of_branch";
pub const VM_CAST_STRING: &str = "vm_cast_string";
pub const VM_MAY_CONTINUE: &str = "vm_may_continue";
pub const VM_DO_STACK: &str = "vm_do_stack";
pub const VM_REENTER_PROMISE: &str = "vm_reenter_promise";
pub const VM_REPORT_HAT: &str = "vm_report_hat";
pub const VM_REPORT_STACK_CLICK: &str = "vm_report_stack_click";
pub const VM_REPORT_MONITOR: &str = "vm_report_monitor";
pub const VM_NULL: &str = "vm_null";

// WELL-KNOWN AUTHOR OPCODES
// ================================================================================================

pub const PROCEDURES_DEFINITION: &str = "procedures_definition";
pub const PROCEDURES_CALL: &str = "procedures_call";
pub const ARGUMENT_REPORTER_STRING_NUMBER: &str = "argument_reporter_string_number";
pub const ARGUMENT_REPORTER_BOOLEAN: &str = "argument_reporter_boolean";

pub const DATA_VARIABLE: &str = "data_variable";
pub const DATA_SET_VARIABLE_TO: &str = "data_setvariableto";
pub const DATA_CHANGE_VARIABLE_BY: &str = "data_changevariableby";

pub const EVENT_BROADCAST_MENU: &str = "event_broadcast_menu";

/// Input and field names with special cache-build handling.
pub const BROADCAST_INPUT: &str = "BROADCAST_INPUT";
pub const BROADCAST_OPTION: &str = "BROADCAST_OPTION";
pub const VARIABLE_FIELD: &str = "VARIABLE";
pub const LIST_FIELD: &str = "LIST";
