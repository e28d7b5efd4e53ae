// cvar.rs -- console variables for world/physics tuning

use crate::common::{com_dprintf, com_printf};

use bitflags::bitflags;
use std::collections::HashMap;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CvarFlags: u32 {
        /// Written out by `write_variables`.
        const ARCHIVE    = 1 << 0;
        /// Sent to clients in serverinfo.
        const SERVERINFO = 1 << 2;
        /// Read-only from the console; `force_set` still works.
        const NOSET      = 1 << 3;
    }
}

/// A console variable.
#[derive(Debug, Clone)]
pub struct Cvar {
    pub name: String,
    pub string: String,
    pub flags: CvarFlags,
    pub modified: bool,
    pub value: f32,
}

/// The cvar registry owned by a `World`.
#[derive(Debug, Default)]
pub struct CvarContext {
    pub cvar_vars: Vec<Cvar>,
    /// O(1) cvar lookup by name -> index in cvar_vars
    cvar_index: HashMap<String, usize>,
}

fn parse_value(s: &str) -> f32 {
    s.trim().parse::<f32>().unwrap_or(0.0)
}

impl CvarContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn find_var_index(&self, name: &str) -> Option<usize> {
        self.cvar_index.get(name).copied()
    }

    pub fn find_var(&self, name: &str) -> Option<&Cvar> {
        self.find_var_index(name).map(|i| &self.cvar_vars[i])
    }

    /// Value of a cvar, 0 when it does not exist.
    pub fn variable_value(&self, name: &str) -> f32 {
        self.find_var(name).map_or(0.0, |v| v.value)
    }

    pub fn variable_string(&self, name: &str) -> &str {
        self.find_var(name).map_or("", |v| v.string.as_str())
    }

    /// Get or create a cvar. If it already exists, the value is not changed
    /// but flags are OR'd in.
    pub fn get(&mut self, name: &str, value: &str, flags: CvarFlags) -> usize {
        if let Some(&idx) = self.cvar_index.get(name) {
            self.cvar_vars[idx].flags |= flags;
            return idx;
        }

        let idx = self.cvar_vars.len();
        self.cvar_vars.push(Cvar {
            name: name.to_string(),
            string: value.to_string(),
            flags,
            modified: true,
            value: parse_value(value),
        });
        self.cvar_index.insert(name.to_string(), idx);
        idx
    }

    fn set2(&mut self, name: &str, value: &str, force: bool) -> usize {
        let idx = match self.find_var_index(name) {
            Some(idx) => idx,
            None => return self.get(name, value, CvarFlags::empty()),
        };

        if !force && self.cvar_vars[idx].flags.contains(CvarFlags::NOSET) {
            com_printf(&format!("{} is write protected.\n", name));
            return idx;
        }

        let var = &mut self.cvar_vars[idx];
        if value == var.string {
            return idx; // not changed
        }
        var.modified = true;
        var.string = value.to_string();
        var.value = parse_value(value);
        idx
    }

    /// Set a cvar value (respects NOSET).
    pub fn set(&mut self, name: &str, value: &str) -> usize {
        self.set2(name, value, false)
    }

    /// Force-set a cvar value (ignores NOSET).
    pub fn force_set(&mut self, name: &str, value: &str) -> usize {
        self.set2(name, value, true)
    }

    /// Set a cvar from a float value.
    pub fn set_value(&mut self, name: &str, value: f32) {
        let val_str = if value == (value as i32) as f32 {
            format!("{}", value as i32)
        } else {
            format!("{}", value)
        };
        self.set(name, &val_str);
    }

    /// Returns and clears the modified flag of a cvar.
    pub fn take_modified(&mut self, name: &str) -> bool {
        match self.find_var_index(name) {
            Some(idx) => std::mem::replace(&mut self.cvar_vars[idx].modified, false),
            None => false,
        }
    }

    /// Apply config text: one `name value` or `set name value` per line,
    /// `//` comments and blank lines ignored. Returns the number of
    /// variables set.
    pub fn exec(&mut self, text: &str) -> usize {
        let mut count = 0;
        for line in text.lines() {
            let line = match line.find("//") {
                Some(pos) => &line[..pos],
                None => line,
            };
            let mut tokens = line.split_whitespace();
            let mut name = match tokens.next() {
                Some(t) => t,
                None => continue,
            };
            if name == "set" {
                name = match tokens.next() {
                    Some(t) => t,
                    None => continue,
                };
            }
            let value = match tokens.next() {
                Some(v) => v.trim_matches('"'),
                None => {
                    com_printf(&format!("\"{}\" is \"{}\"\n", name, self.variable_string(name)));
                    continue;
                }
            };
            com_dprintf(&format!("exec: {} = \"{}\"\n", name, value));
            self.set(name, value);
            count += 1;
        }
        count
    }

    /// Write all ARCHIVE variables as `set name "value"` lines.
    pub fn write_variables(&self, writer: &mut dyn std::io::Write) -> std::io::Result<()> {
        for var in &self.cvar_vars {
            if var.flags.contains(CvarFlags::ARCHIVE) {
                writeln!(writer, "set {} \"{}\"", var.name, var.string)?;
            }
        }
        Ok(())
    }
}

// ============================================================
// Tests
// ============================================================
