//! Shared test fixtures: resource sets and jobspecs.

pub mod fixtures {
    use serde_json::{json, Value};

    /// A version 1 R with `nnodes` ranks of `ncores` cores each.
    pub fn resource_set(nnodes: u32, ncores: u32) -> Value {
        assert!(nnodes > 0 && ncores > 0, "fixture needs at least one core");
        json!({
            "version": 1,
            "execution": {
                "R_lite": [{
                    "rank": idset(nnodes),
                    "children": { "core": idset(ncores) }
                }],
                "starttime": 0,
                "expiration": 0
            }
        })
    }

    /// A version 1 R naming its hosts `prefix0..prefixN`.
    pub fn resource_set_on_hosts(prefix: &str, nnodes: u32, ncores: u32) -> Value {
        let mut r = resource_set(nnodes, ncores);
        r["execution"]["nodelist"] = json!([format!("{prefix}[{}]", idset(nnodes))]);
        r
    }

    /// A minimal single-task jobspec without an R attribute.
    pub fn jobspec() -> Value {
        json!({
            "version": 1,
            "resources": [{
                "type": "slot",
                "count": 1,
                "label": "task",
                "with": [{ "type": "core", "count": 1 }]
            }],
            "tasks": [{
                "command": ["hostname"],
                "slot": "task",
                "count": { "per_slot": 1 }
            }],
            "attributes": {
                "system": { "duration": 0 }
            }
        })
    }

    /// A jobspec carrying `r` at `attributes.system.alloc-bypass.R`.
    pub fn jobspec_with_r(r: Value) -> Value {
        let mut spec = jobspec();
        spec["attributes"]["system"]["alloc-bypass"] = json!({ "R": r });
        spec
    }

    fn idset(n: u32) -> String {
        if n == 1 {
            "0".to_string()
        } else {
            format!("0-{}", n - 1)
        }
    }
}
