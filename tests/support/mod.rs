#![allow(dead_code)]

pub mod irisml_env;
