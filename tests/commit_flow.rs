//! End-to-end commit flow over a three-stage chain.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use viaduct::prelude::*;

type EventLog = Arc<Mutex<Vec<String>>>;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::TRACE)
        .try_init();
}

/// A stage whose format tables are fixed up front and whose hook calls are
/// recorded into a shared event log.
struct ScriptedStage {
    name: String,
    log: EventLog,
    out_formats: Option<Vec<BusFormat>>,
    in_formats: HashMap<BusFormat, Vec<BusFormat>>,
}

impl ScriptedStage {
    fn new(name: &str, log: EventLog) -> Self {
        Self {
            name: name.to_string(),
            log,
            out_formats: None,
            in_formats: HashMap::new(),
        }
    }

    fn outputs(mut self, formats: &[BusFormat]) -> Self {
        self.out_formats = Some(formats.to_vec());
        self
    }

    fn inputs_for(mut self, output: BusFormat, inputs: &[BusFormat]) -> Self {
        self.in_formats.insert(output, inputs.to_vec());
        self
    }

    fn record(&self, event: &str) {
        self.log.lock().unwrap().push(format!("{event}:{}", self.name));
    }
}

impl Stage for ScriptedStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn output_formats(&self) -> Option<FormatList> {
        self.out_formats
            .as_ref()
            .map(|v| v.iter().copied().collect())
    }

    fn input_formats(&self, output: BusFormat) -> Option<FormatList> {
        if self.in_formats.is_empty() {
            return None;
        }
        Some(
            self.in_formats
                .get(&output)
                .into_iter()
                .flatten()
                .copied()
                .collect(),
        )
    }

    fn validate(&mut self, _state: &StageState, params: &PipeParams) -> Result<()> {
        self.record("validate");
        if params.pixel_clock_khz == 0 {
            return Err(Error::InvalidArgument("pixel clock not set".into()));
        }
        Ok(())
    }

    fn disable(&mut self) -> Result<()> {
        self.record("disable");
        Ok(())
    }

    fn post_disable(&mut self) -> Result<()> {
        self.record("post_disable");
        Ok(())
    }

    fn pre_enable(&mut self) -> Result<()> {
        self.record("pre_enable");
        Ok(())
    }

    fn enable(&mut self) -> Result<()> {
        self.record("enable");
        Ok(())
    }
}

struct Fixture {
    pipe: Pipe,
    registry: Arc<Registry>,
    log: EventLog,
    source: StageId,
    converter: StageId,
    sink_stage: StageId,
}

/// Chain: source -> converter -> sink-stage, wired so that negotiation has
/// to backtrack (the converter's preferred Rgb666 input is not producible).
fn fixture() -> Fixture {
    init_tracing();
    let registry = Arc::new(Registry::new());
    let log: EventLog = Arc::new(Mutex::new(Vec::new()));

    let params = PipeParams {
        hactive: 1920,
        vactive: 1080,
        pixel_clock_khz: 148_500,
    };
    let mut pipe = Pipe::new(registry.clone(), params, SinkInfo::default());

    let source = registry
        .register(Box::new(
            ScriptedStage::new("source", log.clone())
                .inputs_for(BusFormat::Rgb666, &[])
                .inputs_for(BusFormat::Yuyv8, &[BusFormat::Uyvy8]),
        ))
        .unwrap();
    let converter = registry
        .register(Box::new(ScriptedStage::new("converter", log.clone()).inputs_for(
            BusFormat::Rgb888,
            &[BusFormat::Rgb666, BusFormat::Yuyv8],
        )))
        .unwrap();
    let sink_stage = registry
        .register(Box::new(
            ScriptedStage::new("sink", log.clone())
                .outputs(&[BusFormat::Rgb888])
                .inputs_for(BusFormat::Rgb888, &[BusFormat::Rgb888]),
        ))
        .unwrap();

    pipe.attach(source, None).unwrap();
    pipe.attach(converter, Some(source)).unwrap();
    pipe.attach(sink_stage, Some(converter)).unwrap();

    Fixture {
        pipe,
        registry,
        log,
        source,
        converter,
        sink_stage,
    }
}

fn hook_events(log: &EventLog) -> Vec<String> {
    log.lock().unwrap().clone()
}

#[test]
fn test_full_commit_sequence() {
    let fx = fixture();
    let mut txn = fx.pipe.open_transaction();

    fx.pipe.duplicate_all(&mut txn).unwrap();
    fx.pipe.negotiate(&mut txn).unwrap();

    // Backtracked assignment: Rgb666 is rejected by the source, so the
    // converter falls back to Yuyv8 and the source feeds it from Uyvy8.
    let source_state = txn.state(fx.source).unwrap();
    assert_eq!(source_state.input_format, BusFormat::Uyvy8);
    assert_eq!(source_state.output_format, BusFormat::Yuyv8);
    let converter_state = txn.state(fx.converter).unwrap();
    assert_eq!(converter_state.input_format, BusFormat::Yuyv8);
    assert_eq!(converter_state.output_format, BusFormat::Rgb888);
    let sink_state = txn.state(fx.sink_stage).unwrap();
    assert_eq!(sink_state.input_format, BusFormat::Rgb888);
    assert_eq!(sink_state.output_format, BusFormat::Rgb888);

    fx.pipe.validate(&txn).unwrap();

    let head = fx.source;
    fx.pipe.run_phase(Phase::Disable, &txn, head).unwrap();
    fx.pipe.run_phase(Phase::PostDisable, &txn, head).unwrap();
    fx.pipe.run_phase(Phase::PreEnable, &txn, head).unwrap();
    fx.pipe.run_phase(Phase::Enable, &txn, head).unwrap();

    fx.pipe.commit(&mut txn).unwrap();
    assert_eq!(txn.status(), TransactionStatus::Committed);

    // Committed states now carry the negotiated formats.
    let committed = fx
        .registry
        .committed_state(fx.converter)
        .unwrap()
        .unwrap();
    assert_eq!(committed.input_format, BusFormat::Yuyv8);
    assert_eq!(committed.output_format, BusFormat::Rgb888);

    // Exact hook ordering: validate sink-first, disable/pre_enable in
    // reverse, post_disable/enable forward.
    assert_eq!(
        hook_events(&fx.log),
        vec![
            "validate:sink",
            "validate:converter",
            "validate:source",
            "disable:sink",
            "disable:converter",
            "disable:source",
            "post_disable:source",
            "post_disable:converter",
            "post_disable:sink",
            "pre_enable:sink",
            "pre_enable:converter",
            "pre_enable:source",
            "enable:source",
            "enable:converter",
            "enable:sink",
        ]
    );
}

#[test]
fn test_discard_restores_nothing() {
    let fx = fixture();

    // Establish a committed configuration.
    let mut first = fx.pipe.open_transaction();
    fx.pipe.duplicate_all(&mut first).unwrap();
    fx.pipe.negotiate(&mut first).unwrap();
    fx.pipe.commit(&mut first).unwrap();

    let before = fx
        .registry
        .committed_state(fx.source)
        .unwrap()
        .unwrap();

    // A second transaction is mutated, then discarded.
    let mut second = fx.pipe.open_transaction();
    fx.pipe.duplicate_all(&mut second).unwrap();
    second.state_mut(fx.source).unwrap().output_format = BusFormat::LvdsVesa24;
    fx.pipe.discard(&mut second).unwrap();
    assert_eq!(second.status(), TransactionStatus::Discarded);

    let after = fx
        .registry
        .committed_state(fx.source)
        .unwrap()
        .unwrap();
    assert_eq!(before.input_format, after.input_format);
    assert_eq!(before.output_format, after.output_format);
}

#[test]
fn test_failed_negotiation_leaves_default_states() {
    init_tracing();
    let registry = Arc::new(Registry::new());
    let log: EventLog = Arc::new(Mutex::new(Vec::new()));
    let mut pipe = Pipe::new(
        registry.clone(),
        PipeParams::default(),
        SinkInfo::default(),
    );

    // The sink stage insists on an input nothing upstream can produce.
    let source = registry
        .register(Box::new(
            ScriptedStage::new("source", log.clone()).inputs_for(BusFormat::Yuyv8, &[]),
        ))
        .unwrap();
    let sink_stage = registry
        .register(Box::new(
            ScriptedStage::new("sink", log)
                .outputs(&[BusFormat::Rgb888])
                .inputs_for(BusFormat::Rgb888, &[BusFormat::Yuyv8]),
        ))
        .unwrap();
    pipe.attach(source, None).unwrap();
    pipe.attach(sink_stage, Some(source)).unwrap();

    let mut txn = pipe.open_transaction();
    pipe.duplicate_all(&mut txn).unwrap();
    let err = pipe.negotiate(&mut txn).unwrap_err();
    assert!(matches!(err, Error::Unsupported(_)));

    for id in [source, sink_stage] {
        let state = txn.state(id).unwrap();
        assert!(state.input_format.is_fixed());
        assert!(state.output_format.is_fixed());
    }
}

#[test]
fn test_validation_failure_names_the_stage() {
    init_tracing();
    let registry = Arc::new(Registry::new());
    let log: EventLog = Arc::new(Mutex::new(Vec::new()));
    // pixel_clock_khz of zero makes every ScriptedStage::validate fail.
    let mut pipe = Pipe::new(
        registry.clone(),
        PipeParams::default(),
        SinkInfo::default(),
    );
    let stage = registry
        .register(Box::new(ScriptedStage::new("edp", log)))
        .unwrap();
    pipe.attach(stage, None).unwrap();

    let mut txn = pipe.open_transaction();
    pipe.duplicate_all(&mut txn).unwrap();
    pipe.negotiate(&mut txn).unwrap();

    match pipe.validate(&txn).unwrap_err() {
        Error::StageRejected { stage, phase, .. } => {
            assert_eq!(stage, "edp");
            assert_eq!(phase, "validate");
        }
        other => panic!("unexpected error: {other}"),
    }
}
