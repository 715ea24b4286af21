//! Recording fakes for the scheduler's collaborators.
//!
//! Every fake returns a canned [`Returns`] (optionally overridden per call)
//! and records its arguments. All fakes built by a [`Harness`] share one
//! [`CallLog`] so tests can assert on the order of calls across collaborators.

use async_trait::async_trait;
use conveyor_core::plan::TaskPlan;
use conveyor_core::{
    Build, BuildId, BuildInput, BuildStatus, Engine, EngineBuild, Error, InputMapping, Job,
    JobConfig, JobId, Pipeline, Plan, PlanId, PlanStep, ResourceConfig, Result, VersionId,
    VersionedResourceType, VersionsDb,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

use crate::build_starter::PipelineBuildStarter;
use crate::factory::BuildFactory;
use crate::inputmapper::InputMapper;
use crate::maxinflight::MaxInFlightUpdater;
use crate::scanner::Scanner;

pub const DISASTER: &str = "bad thing";

pub fn disaster() -> Error {
    Error::Internal(DISASTER.to_string())
}

pub fn is_disaster(err: &Error) -> bool {
    matches!(err, Error::Internal(message) if message == DISASTER)
}

/// A canned result.
#[derive(Debug, Clone)]
pub enum Returns<T> {
    Value(T),
    Disaster,
}

/// A canned result with per-call overrides, counting calls.
pub struct Stub<T> {
    default: Mutex<Returns<T>>,
    on_call: Mutex<HashMap<usize, Returns<T>>>,
    calls: AtomicUsize,
}

impl<T: Clone> Stub<T> {
    pub fn new(value: T) -> Self {
        Self {
            default: Mutex::new(Returns::Value(value)),
            on_call: Mutex::new(HashMap::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn returns(&self, returns: Returns<T>) {
        *self.default.lock().unwrap() = returns;
    }

    /// Override the result of the `call`th call (zero-based).
    pub fn returns_on_call(&self, call: usize, returns: Returns<T>) {
        self.on_call.lock().unwrap().insert(call, returns);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next(&self) -> Result<T> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let returns = match self.on_call.lock().unwrap().get(&call) {
            Some(returns) => returns.clone(),
            None => self.default.lock().unwrap().clone(),
        };
        match returns {
            Returns::Value(value) => Ok(value),
            Returns::Disaster => Err(disaster()),
        }
    }
}

/// Ordered record of calls across all fakes.
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn record(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn position(&self, entry: &str) -> Option<usize> {
        self.entries().iter().position(|e| e == entry)
    }
}

/// Poll `condition` on the tokio clock until it holds, panicking after a second.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition was not met within 1s");
}

pub fn some_input() -> BuildInput {
    BuildInput {
        name: "some-input".to_string(),
        version_id: VersionId::new(1),
        resource: "some-resource".to_string(),
        resource_type: "git".to_string(),
        version: [("ref".to_string(), "abc".to_string())].into(),
        first_occurrence: true,
    }
}

pub fn task_plan(config_path: &str) -> Plan {
    Plan {
        id: PlanId::new("1"),
        step: PlanStep::Task(TaskPlan {
            name: "some-task".to_string(),
            config_path: Some(config_path.to_string()),
            privileged: false,
        }),
    }
}

pub struct FakeBuild {
    id: BuildId,
    manually_triggered: bool,
    log: CallLog,
    pub schedule: Stub<bool>,
    pub use_inputs: Stub<()>,
    pub finish: Stub<()>,
    use_inputs_args: Mutex<Vec<Vec<BuildInput>>>,
    finish_args: Mutex<Vec<BuildStatus>>,
}

impl FakeBuild {
    pub fn new(id: i64, log: &CallLog) -> Self {
        Self {
            id: BuildId::new(id),
            manually_triggered: false,
            log: log.clone(),
            schedule: Stub::new(true),
            use_inputs: Stub::new(()),
            finish: Stub::new(()),
            use_inputs_args: Mutex::new(Vec::new()),
            finish_args: Mutex::new(Vec::new()),
        }
    }

    pub fn manually_triggered(mut self) -> Self {
        self.manually_triggered = true;
        self
    }

    pub fn use_inputs_args(&self) -> Vec<Vec<BuildInput>> {
        self.use_inputs_args.lock().unwrap().clone()
    }

    pub fn finish_args(&self) -> Vec<BuildStatus> {
        self.finish_args.lock().unwrap().clone()
    }
}

#[async_trait]
impl Build for FakeBuild {
    fn id(&self) -> BuildId {
        self.id
    }

    fn is_manually_triggered(&self) -> bool {
        self.manually_triggered
    }

    async fn schedule(&self) -> Result<bool> {
        self.log.record(format!("schedule:{}", self.id));
        self.schedule.next()
    }

    async fn use_inputs(&self, inputs: &[BuildInput]) -> Result<()> {
        self.log.record(format!("use_inputs:{}", self.id));
        self.use_inputs_args.lock().unwrap().push(inputs.to_vec());
        self.use_inputs.next()
    }

    async fn finish(&self, status: BuildStatus) -> Result<()> {
        self.log.record(format!("finish:{}:{}", self.id, status));
        self.finish_args.lock().unwrap().push(status);
        self.finish.next()
    }
}

#[derive(Clone)]
pub struct FakeJob {
    pub name: String,
    pub paused: bool,
}

impl Job for FakeJob {
    fn id(&self) -> JobId {
        JobId::new(13)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn paused(&self) -> bool {
        self.paused
    }
}

pub struct FakePipeline {
    log: CallLog,
    pub check_paused: Stub<bool>,
    pub job: Stub<Option<FakeJob>>,
    pub next_build_inputs: Stub<Option<Vec<BuildInput>>>,
    pub load_versions_db: Stub<VersionsDb>,
    pub save_next_input_mapping: Stub<()>,
    pub delete_next_input_mapping: Stub<()>,
    pub running_builds: Stub<Vec<BuildId>>,
    pub next_pending_build: Stub<Option<BuildId>>,
    pub set_max_in_flight_reached: Stub<()>,
    saved_mappings: Mutex<Vec<(String, InputMapping)>>,
    serial_group_queries: Mutex<Vec<(String, Vec<String>)>>,
    max_in_flight_reached_args: Mutex<Vec<(String, bool)>>,
}

impl FakePipeline {
    pub fn new(log: &CallLog) -> Self {
        Self {
            log: log.clone(),
            check_paused: Stub::new(false),
            job: Stub::new(Some(FakeJob {
                name: "some-job".to_string(),
                paused: false,
            })),
            next_build_inputs: Stub::new(Some(vec![some_input()])),
            load_versions_db: Stub::new(VersionsDb::default()),
            save_next_input_mapping: Stub::new(()),
            delete_next_input_mapping: Stub::new(()),
            running_builds: Stub::new(Vec::new()),
            next_pending_build: Stub::new(None),
            set_max_in_flight_reached: Stub::new(()),
            saved_mappings: Mutex::new(Vec::new()),
            serial_group_queries: Mutex::new(Vec::new()),
            max_in_flight_reached_args: Mutex::new(Vec::new()),
        }
    }

    pub fn saved_mappings(&self) -> Vec<(String, InputMapping)> {
        self.saved_mappings.lock().unwrap().clone()
    }

    pub fn serial_group_queries(&self) -> Vec<(String, Vec<String>)> {
        self.serial_group_queries.lock().unwrap().clone()
    }

    pub fn max_in_flight_reached_args(&self) -> Vec<(String, bool)> {
        self.max_in_flight_reached_args.lock().unwrap().clone()
    }
}

#[async_trait]
impl Pipeline for FakePipeline {
    fn name(&self) -> &str {
        "some-pipeline"
    }

    async fn check_paused(&self) -> Result<bool> {
        self.log.record("check_paused");
        self.check_paused.next()
    }

    async fn job(&self, name: &str) -> Result<Option<Arc<dyn Job>>> {
        self.log.record(format!("job:{}", name));
        let job = self.job.next()?;
        Ok(job.map(|j| Arc::new(j) as Arc<dyn Job>))
    }

    async fn next_build_inputs(&self, job_name: &str) -> Result<Option<Vec<BuildInput>>> {
        self.log.record(format!("next_build_inputs:{}", job_name));
        self.next_build_inputs.next()
    }

    async fn load_versions_db(&self) -> Result<VersionsDb> {
        self.log.record("load_versions_db");
        self.load_versions_db.next()
    }

    async fn save_next_input_mapping(&self, job_name: &str, mapping: &InputMapping) -> Result<()> {
        self.log.record(format!("save_next_input_mapping:{}", job_name));
        self.saved_mappings
            .lock()
            .unwrap()
            .push((job_name.to_string(), mapping.clone()));
        self.save_next_input_mapping.next()
    }

    async fn delete_next_input_mapping(&self, job_name: &str) -> Result<()> {
        self.log.record(format!("delete_next_input_mapping:{}", job_name));
        self.delete_next_input_mapping.next()
    }

    async fn running_builds_by_serial_group(
        &self,
        job_name: &str,
        serial_groups: &[String],
    ) -> Result<Vec<BuildId>> {
        self.serial_group_queries
            .lock()
            .unwrap()
            .push((job_name.to_string(), serial_groups.to_vec()));
        self.running_builds.next()
    }

    async fn next_pending_build_by_serial_group(
        &self,
        job_name: &str,
        serial_groups: &[String],
    ) -> Result<Option<BuildId>> {
        self.serial_group_queries
            .lock()
            .unwrap()
            .push((job_name.to_string(), serial_groups.to_vec()));
        self.next_pending_build.next()
    }

    async fn set_max_in_flight_reached(&self, job_name: &str, reached: bool) -> Result<()> {
        self.max_in_flight_reached_args
            .lock()
            .unwrap()
            .push((job_name.to_string(), reached));
        self.set_max_in_flight_reached.next()
    }
}

pub struct FakeUpdater {
    log: CallLog,
    pub reached: Stub<bool>,
    args: Mutex<Vec<(JobConfig, BuildId)>>,
}

impl FakeUpdater {
    pub fn new(log: &CallLog) -> Self {
        Self {
            log: log.clone(),
            reached: Stub::new(false),
            args: Mutex::new(Vec::new()),
        }
    }

    pub fn args(&self) -> Vec<(JobConfig, BuildId)> {
        self.args.lock().unwrap().clone()
    }

    pub fn build_ids(&self) -> Vec<BuildId> {
        self.args().into_iter().map(|(_, id)| id).collect()
    }
}

#[async_trait]
impl MaxInFlightUpdater for FakeUpdater {
    async fn update_max_in_flight_reached(
        &self,
        job_config: &JobConfig,
        build_id: BuildId,
    ) -> Result<bool> {
        self.log.record(format!("max_in_flight:{}", build_id));
        self.args
            .lock()
            .unwrap()
            .push((job_config.clone(), build_id));
        self.reached.next()
    }
}

pub struct FakeScanner {
    log: CallLog,
    pub scan: Stub<()>,
    args: Mutex<Vec<String>>,
}

impl FakeScanner {
    pub fn new(log: &CallLog) -> Self {
        Self {
            log: log.clone(),
            scan: Stub::new(()),
            args: Mutex::new(Vec::new()),
        }
    }

    pub fn args(&self) -> Vec<String> {
        self.args.lock().unwrap().clone()
    }
}

#[async_trait]
impl Scanner for FakeScanner {
    async fn scan(&self, resource_name: &str) -> Result<()> {
        self.log.record(format!("scan:{}", resource_name));
        self.args.lock().unwrap().push(resource_name.to_string());
        self.scan.next()
    }
}

pub struct FakeInputMapper {
    log: CallLog,
    pub mapping: Stub<Option<InputMapping>>,
    args: Mutex<Vec<(VersionsDb, JobConfig)>>,
}

impl FakeInputMapper {
    pub fn new(log: &CallLog) -> Self {
        Self {
            log: log.clone(),
            mapping: Stub::new(None),
            args: Mutex::new(Vec::new()),
        }
    }

    pub fn args(&self) -> Vec<(VersionsDb, JobConfig)> {
        self.args.lock().unwrap().clone()
    }
}

#[async_trait]
impl InputMapper for FakeInputMapper {
    async fn save_next_input_mapping(
        &self,
        versions: &VersionsDb,
        job_config: &JobConfig,
    ) -> Result<Option<InputMapping>> {
        self.log.record("save_next_input_mapping");
        self.args
            .lock()
            .unwrap()
            .push((versions.clone(), job_config.clone()));
        self.mapping.next()
    }
}

pub type FactoryArgs = (
    JobConfig,
    Vec<ResourceConfig>,
    Vec<VersionedResourceType>,
    Vec<BuildInput>,
);

pub struct FakeFactory {
    log: CallLog,
    pub plan: Stub<Plan>,
    args: Mutex<Vec<FactoryArgs>>,
}

impl FakeFactory {
    pub fn new(log: &CallLog) -> Self {
        Self {
            log: log.clone(),
            plan: Stub::new(task_plan("some-task-1.yml")),
            args: Mutex::new(Vec::new()),
        }
    }

    pub fn args(&self) -> Vec<FactoryArgs> {
        self.args.lock().unwrap().clone()
    }
}

impl BuildFactory for FakeFactory {
    fn create(
        &self,
        job_config: &JobConfig,
        resources: &[ResourceConfig],
        resource_types: &[VersionedResourceType],
        inputs: &[BuildInput],
    ) -> Result<Plan> {
        self.log.record("create_plan");
        self.args.lock().unwrap().push((
            job_config.clone(),
            resources.to_vec(),
            resource_types.to_vec(),
            inputs.to_vec(),
        ));
        self.plan.next()
    }
}

/// An engine build that counts resumes and can be held at a gate.
#[derive(Clone)]
pub struct FakeEngineBuild {
    pub build_id: BuildId,
    resumes_started: Arc<AtomicUsize>,
    resumes_finished: Arc<AtomicUsize>,
    gate: Option<Arc<Semaphore>>,
}

impl FakeEngineBuild {
    pub fn resume_call_count(&self) -> usize {
        self.resumes_started.load(Ordering::SeqCst)
    }

    pub fn resumes_finished(&self) -> usize {
        self.resumes_finished.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EngineBuild for FakeEngineBuild {
    async fn resume(&self) {
        self.resumes_started.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        self.resumes_finished.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct FakeEngine {
    log: CallLog,
    pub create_build: Stub<()>,
    gate: Mutex<Option<Arc<Semaphore>>>,
    args: Mutex<Vec<(BuildId, Plan)>>,
    created: Mutex<Vec<FakeEngineBuild>>,
}

impl FakeEngine {
    pub fn new(log: &CallLog) -> Self {
        Self {
            log: log.clone(),
            create_build: Stub::new(()),
            gate: Mutex::new(None),
            args: Mutex::new(Vec::new()),
            created: Mutex::new(Vec::new()),
        }
    }

    /// Hold every engine build created from now on at `gate` inside resume.
    pub fn gate_resumes(&self, gate: Arc<Semaphore>) {
        *self.gate.lock().unwrap() = Some(gate);
    }

    pub fn args(&self) -> Vec<(BuildId, Plan)> {
        self.args.lock().unwrap().clone()
    }

    pub fn created(&self) -> Vec<FakeEngineBuild> {
        self.created.lock().unwrap().clone()
    }
}

#[async_trait]
impl Engine for FakeEngine {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn create_build(&self, build: Arc<dyn Build>, plan: Plan) -> Result<Box<dyn EngineBuild>> {
        self.log.record(format!("create_build:{}", build.id()));
        self.args.lock().unwrap().push((build.id(), plan));
        self.create_build.next()?;

        let engine_build = FakeEngineBuild {
            build_id: build.id(),
            resumes_started: Arc::new(AtomicUsize::new(0)),
            resumes_finished: Arc::new(AtomicUsize::new(0)),
            gate: self.gate.lock().unwrap().clone(),
        };
        self.created.lock().unwrap().push(engine_build.clone());
        Ok(Box::new(engine_build))
    }
}

/// All fakes wired together, defaulting to a pass where every check succeeds.
pub struct Harness {
    pub log: CallLog,
    pub pipeline: Arc<FakePipeline>,
    pub updater: Arc<FakeUpdater>,
    pub factory: Arc<FakeFactory>,
    pub scanner: Arc<FakeScanner>,
    pub input_mapper: Arc<FakeInputMapper>,
    pub engine: Arc<FakeEngine>,
}

impl Harness {
    pub fn new() -> Self {
        let log = CallLog::default();
        Self {
            pipeline: Arc::new(FakePipeline::new(&log)),
            updater: Arc::new(FakeUpdater::new(&log)),
            factory: Arc::new(FakeFactory::new(&log)),
            scanner: Arc::new(FakeScanner::new(&log)),
            input_mapper: Arc::new(FakeInputMapper::new(&log)),
            engine: Arc::new(FakeEngine::new(&log)),
            log,
        }
    }

    pub fn build(&self, id: i64) -> Arc<FakeBuild> {
        Arc::new(FakeBuild::new(id, &self.log))
    }

    pub fn build_starter(&self) -> PipelineBuildStarter {
        PipelineBuildStarter::new(
            self.pipeline.clone(),
            self.updater.clone(),
            self.factory.clone(),
            self.scanner.clone(),
            self.input_mapper.clone(),
            self.engine.clone(),
        )
    }
}

/// Upcast fake builds into the trait objects the build starter takes.
pub fn pending(builds: &[Arc<FakeBuild>]) -> Vec<Arc<dyn Build>> {
    builds
        .iter()
        .map(|b| b.clone() as Arc<dyn Build>)
        .collect()
}
