/*
 * Copyright (c) 2024. Govcraft
 *
 * Licensed under either of
 *   * Apache License, Version 2.0 (the "License");
 *     you may not use this file except in compliance with the License.
 *     You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0
 *   * MIT license: http://opensource.org/licenses/MIT
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the applicable License for the specific language governing permissions and
 * limitations under that License.
 */
#![allow(unused)]

use relaymesh::prelude::*;

#[relay_message(eq)]
pub struct Reading {
    pub sensor: String,
    pub value: f64,
}

#[relay_message(eq)]
pub enum Command {
    Start,
    Stop,
    Move { x: i32, y: i32 },
}

#[relay_message(eq)]
pub struct Note(pub String);

impl Reading {
    pub fn new(sensor: &str, value: f64) -> Self {
        Self {
            sensor: sensor.to_string(),
            value,
        }
    }
}
