mod fixtures;

mod compile_tests;
mod control_tests;
mod exec_tests;
mod hat_tests;
mod promise_tests;
mod scheduling_tests;
