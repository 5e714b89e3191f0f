use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::{ConfigError, UpdateError};
use crate::operation::{is_valid_segment, Operation, ParamKind, ParamValue, Pipeline};

struct Handler {
    operation: Arc<Operation>,
    tag: &'static str,
    kind: ParamKind,
}

/// Maps `<operation>/<tag>` to the parameter it controls. Built once from
/// the pipeline; handlers can be called from any thread.
pub struct ParameterRegistry {
    handlers: BTreeMap<String, Handler>,
    rejected: AtomicU64,
}

impl ParameterRegistry {
    pub fn new(pipeline: &Pipeline) -> Result<ParameterRegistry, ConfigError> {
        let mut handlers = BTreeMap::new();

        for operation in pipeline.operations() {
            for (tag, kind) in operation.declared() {
                if !is_valid_segment(tag) {
                    return Err(ConfigError::InvalidParameterTag {
                        operation: operation.name().to_string(),
                        tag: tag.to_string(),
                    });
                }

                let name = format!("{}/{}", operation.name(), tag);
                if handlers.contains_key(&name) {
                    return Err(ConfigError::DuplicateParameter(name));
                }

                log::info!("Found exported parameter: {name} ({kind})");
                handlers.insert(
                    name,
                    Handler {
                        operation: Arc::clone(operation),
                        tag,
                        kind,
                    },
                );
            }
        }

        Ok(ParameterRegistry {
            handlers,
            rejected: AtomicU64::new(0),
        })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    pub fn get(&self, name: &str) -> Option<ParamValue> {
        let handler = self.handlers.get(name)?;
        handler.operation.get(handler.tag)
    }

    /// Parses `payload` and stores it. Nothing is written unless the whole
    /// payload parses.
    pub fn apply(&self, name: &str, payload: &str) -> Result<ParamValue, UpdateError> {
        let handler = self
            .handlers
            .get(name)
            .ok_or_else(|| UpdateError::UnknownParameter(name.to_string()))?;

        let value =
            ParamValue::parse(handler.kind, payload).map_err(|reason| UpdateError::Parse {
                name: name.to_string(),
                payload: payload.to_string(),
                kind: handler.kind,
                reason,
            })?;

        // The table is fixed and the kind came from it, so this cannot miss.
        if !handler.operation.set(handler.tag, value.clone()) {
            log::error!("{name} vanished from its operation");
        }

        Ok(value)
    }

    /// Entry point for control transports. Logs the outcome once and hands
    /// it back so the caller can echo state. Transports must not report a
    /// rejected update again.
    pub fn handle(&self, name: &str, payload: &str) -> Result<ParamValue, UpdateError> {
        let result = self.apply(name, payload);
        match &result {
            Ok(value) => log::info!("Setting {name} = {value}"),
            Err(err) => {
                let total = self.rejected.fetch_add(1, Ordering::Relaxed) + 1;
                log::warn!("Dropping update ({total} dropped so far): {err}");
            }
        }
        result
    }

    #[cfg(test)]
    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Duration;

    use super::*;
    use crate::operation::tests::Fill;
    use crate::operation::{Effect, Parameter};
    use crate::pixel::{Pixel, PixelBuffer};

    fn registry_for(names: &[&str]) -> (Pipeline, ParameterRegistry) {
        let operations = names
            .iter()
            .map(|name| Operation::new(name, Fill::new([0, 0, 0])))
            .collect();
        let pipeline = Pipeline::new(operations).unwrap();
        let registry = ParameterRegistry::new(&pipeline).unwrap();
        (pipeline, registry)
    }

    #[test]
    fn builds_names_from_operation_and_tag() {
        let (_, registry) = registry_for(&["rainbow", "drops"]);
        let names: Vec<&str> = registry.names().collect();
        assert_eq!(
            names,
            vec![
                "drops/count",
                "drops/enabled",
                "drops/label",
                "drops/speed",
                "rainbow/count",
                "rainbow/enabled",
                "rainbow/label",
                "rainbow/speed",
            ]
        );
        assert_eq!(registry.get("rainbow/speed"), Some(ParamValue::Float(1.0)));
        assert_eq!(registry.get("rainbow/nothing"), None);
    }

    #[test]
    fn float_update_applies() {
        let (_, registry) = registry_for(&["rainbow"]);
        assert_eq!(registry.handle("rainbow/speed", "2.5"), Ok(ParamValue::Float(2.5)));
        assert_eq!(registry.get("rainbow/speed"), Some(ParamValue::Float(2.5)));
    }

    #[test]
    fn malformed_update_leaves_value_alone() {
        let (_, registry) = registry_for(&["rainbow"]);
        registry.apply("rainbow/speed", "2.5").unwrap();
        let before = registry.get("rainbow/speed");

        let err = registry.handle("rainbow/speed", "fast").unwrap_err();
        match err {
            UpdateError::Parse {
                name,
                payload,
                kind,
                ..
            } => {
                assert_eq!(name, "rainbow/speed");
                assert_eq!(payload, "fast");
                assert_eq!(kind, ParamKind::Float);
            }
            other => panic!("unexpected error {other:?}"),
        }

        assert_eq!(registry.rejected(), 1);

        let after = registry.get("rainbow/speed");
        assert_eq!(before, after);
        match after {
            Some(ParamValue::Float(v)) => assert_eq!(v.to_bits(), 2.5f64.to_bits()),
            other => panic!("unexpected value {other:?}"),
        }
    }

    #[test]
    fn every_kind_round_trips_from_text() {
        let (_, registry) = registry_for(&["op"]);
        registry.apply("op/count", "-7").unwrap();
        registry.apply("op/enabled", "false").unwrap();
        registry.apply("op/label", "hello world").unwrap();
        assert_eq!(registry.get("op/count"), Some(ParamValue::Integer(-7)));
        assert_eq!(registry.get("op/enabled"), Some(ParamValue::Bool(false)));
        assert_eq!(
            registry.get("op/label"),
            Some(ParamValue::Text("hello world".to_string()))
        );
    }

    #[test]
    fn unknown_name_is_rejected() {
        let (_, registry) = registry_for(&["op"]);
        assert_eq!(
            registry.apply("other/speed", "1"),
            Err(UpdateError::UnknownParameter("other/speed".to_string()))
        );
    }

    struct Twice {
        a: f64,
        b: f64,
    }

    impl Effect for Twice {
        fn parameters(&mut self) -> Vec<Parameter<'_>> {
            vec![Parameter::float("x", &mut self.a), Parameter::float("x", &mut self.b)]
        }

        fn render(&mut self, _: &mut [Pixel]) -> Result<(), String> {
            Ok(())
        }
    }

    struct Slashed {
        a: bool,
    }

    impl Effect for Slashed {
        fn parameters(&mut self) -> Vec<Parameter<'_>> {
            vec![Parameter::bool("on/off", &mut self.a)]
        }

        fn render(&mut self, _: &mut [Pixel]) -> Result<(), String> {
            Ok(())
        }
    }

    #[test]
    fn duplicate_tags_fail_at_startup() {
        let pipeline = Pipeline::new(vec![Operation::new("twice", Twice { a: 0.0, b: 0.0 })]).unwrap();
        assert_eq!(
            ParameterRegistry::new(&pipeline).err(),
            Some(ConfigError::DuplicateParameter("twice/x".to_string()))
        );
    }

    #[test]
    fn bad_tags_fail_at_startup() {
        let pipeline = Pipeline::new(vec![Operation::new("s", Slashed { a: false })]).unwrap();
        assert_eq!(
            ParameterRegistry::new(&pipeline).err(),
            Some(ConfigError::InvalidParameterTag {
                operation: "s".to_string(),
                tag: "on/off".to_string(),
            })
        );
    }

    /// Counts renders and records the `count` parameter each time it renders.
    struct Recorder {
        count: i64,
        seen: Arc<std::sync::Mutex<Vec<i64>>>,
    }

    impl Effect for Recorder {
        fn parameters(&mut self) -> Vec<Parameter<'_>> {
            vec![Parameter::integer("count", &mut self.count)]
        }

        fn render(&mut self, _: &mut [Pixel]) -> Result<(), String> {
            self.seen.lock().unwrap().push(self.count);
            Ok(())
        }
    }

    #[test]
    fn render_sees_each_update_once() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let pipeline = Pipeline::new(vec![Operation::new(
            "rec",
            Recorder {
                count: 0,
                seen: Arc::clone(&seen),
            },
        )])
        .unwrap();
        let registry = ParameterRegistry::new(&pipeline).unwrap();
        let mut buffer = PixelBuffer::new(1);

        pipeline.render(buffer.pixels_mut()).unwrap();
        registry.apply("rec/count", "5").unwrap();
        pipeline.render(buffer.pixels_mut()).unwrap();
        pipeline.render(buffer.pixels_mut()).unwrap();
        registry.apply("rec/count", "6").unwrap();
        pipeline.render(buffer.pixels_mut()).unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![0, 5, 5, 6]);
    }

    #[test]
    fn updates_to_different_operations_do_not_block() {
        let (locked_tx, locked_rx) = crossbeam_channel::bounded(0);
        let (release_tx, release_rx) = crossbeam_channel::bounded::<()>(0);
        let pipeline = Pipeline::new(vec![
            Operation::new(
                "slow",
                Blocker {
                    speed: 0.0,
                    locked: locked_tx,
                    release: release_rx,
                },
            ),
            Operation::new("left", Fill::new([0, 0, 0])),
            Operation::new("right", Fill::new([0, 0, 0])),
        ])
        .unwrap();
        let registry = Arc::new(ParameterRegistry::new(&pipeline).unwrap());

        // Park a render inside `slow` so its lock stays held.
        let slow = Arc::clone(&pipeline.operations()[0]);
        let holder = thread::spawn(move || {
            let mut buffer = PixelBuffer::new(1);
            slow.render(buffer.pixels_mut())
        });
        locked_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        let (done_tx, done_rx) = crossbeam_channel::unbounded();
        let mut workers = Vec::new();
        for name in ["left/speed", "right/speed"] {
            let registry = Arc::clone(&registry);
            let done_tx = done_tx.clone();
            workers.push(thread::spawn(move || {
                for i in 0..1000 {
                    registry.apply(name, &i.to_string()).unwrap();
                }
                done_tx.send(name).unwrap();
            }));
        }

        let mut finished = vec![
            done_rx.recv_timeout(Duration::from_secs(5)).unwrap(),
            done_rx.recv_timeout(Duration::from_secs(5)).unwrap(),
        ];
        finished.sort();
        assert_eq!(finished, vec!["left/speed", "right/speed"]);

        release_tx.send(()).unwrap();
        holder.join().unwrap().unwrap();
        for worker in workers {
            worker.join().unwrap();
        }
        assert_eq!(registry.get("left/speed"), Some(ParamValue::Float(999.0)));
        assert_eq!(registry.get("right/speed"), Some(ParamValue::Float(999.0)));

        // With the render finished, `slow` accepts updates again.
        assert_eq!(registry.apply("slow/speed", "3"), Ok(ParamValue::Float(3.0)));
    }

    /// Parks inside `render` until released, holding its operation lock.
    struct Blocker {
        speed: f64,
        locked: crossbeam_channel::Sender<()>,
        release: crossbeam_channel::Receiver<()>,
    }

    impl Effect for Blocker {
        fn parameters(&mut self) -> Vec<Parameter<'_>> {
            vec![Parameter::float("speed", &mut self.speed)]
        }

        fn render(&mut self, _: &mut [Pixel]) -> Result<(), String> {
            self.locked.send(()).map_err(|err| err.to_string())?;
            self.release.recv().map_err(|err| err.to_string())?;
            Ok(())
        }
    }
}
