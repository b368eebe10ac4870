//! Typed client facade
//!
//! Wraps the generic engine client with one repository accessor per
//! entity, relation traversal helpers, and tag attachment for the three
//! implicit many-to-many associations.

use courtside_orm::{
    Client, ClientBuilder, ErrorFormat, FindManyArgs, LogEvent, LogLevel, Middleware, OrmError,
    OrmResult, Repository, TransactionClient, TransactionOptions,
};

use crate::entities::{
    BlocEchauffement, Echauffement, Entrainement, EntrainementExercice, Exercice, SituationMatch,
    Tag, User,
};
use crate::schema;

pub struct CourtsideClientBuilder {
    inner: ClientBuilder,
}

impl CourtsideClientBuilder {
    pub fn datasource_url(mut self, url: impl Into<String>) -> Self {
        self.inner = self.inner.datasource_url(url);
        self
    }

    pub fn log(mut self, levels: impl IntoIterator<Item = LogLevel>) -> Self {
        self.inner = self.inner.log(levels);
        self
    }

    pub fn on_log(mut self, callback: impl Fn(&LogEvent) + Send + Sync + 'static) -> Self {
        self.inner = self.inner.on_log(callback);
        self
    }

    pub fn error_format(mut self, format: ErrorFormat) -> Self {
        self.inner = self.inner.error_format(format);
        self
    }

    pub fn transaction_options(mut self, options: TransactionOptions) -> Self {
        self.inner = self.inner.transaction_options(options);
        self
    }

    pub fn pool_config(mut self, config: courtside_orm::backends::postgres::PoolConfig) -> Self {
        self.inner = self.inner.pool_config(config);
        self
    }

    pub fn middleware(mut self, middleware: impl Middleware + 'static) -> Self {
        self.inner = self.inner.middleware(middleware);
        self
    }

    pub fn build(self) -> OrmResult<CourtsideClient> {
        Ok(CourtsideClient {
            inner: self.inner.build()?,
        })
    }
}

/// Data-access client for the training planner
#[derive(Clone)]
pub struct CourtsideClient {
    inner: Client,
}

impl CourtsideClient {
    pub fn builder() -> CourtsideClientBuilder {
        CourtsideClientBuilder {
            inner: Client::builder(schema::schema()),
        }
    }

    /// In-memory client, already connected; the test-suite entry point
    pub async fn connect_memory() -> OrmResult<Self> {
        let client = Self::builder().build()?;
        client.connect().await?;
        Ok(client)
    }

    pub async fn connect(&self) -> OrmResult<()> {
        self.inner.connect().await
    }

    pub async fn disconnect(&self) -> OrmResult<()> {
        self.inner.disconnect().await
    }

    pub fn inner(&self) -> &Client {
        &self.inner
    }

    pub fn render_error(&self, error: &OrmError) -> String {
        self.inner.render_error(error)
    }

    pub fn exercice(&self) -> Repository<Exercice> {
        self.inner.repository()
    }

    pub fn tag(&self) -> Repository<Tag> {
        self.inner.repository()
    }

    pub fn entrainement(&self) -> Repository<Entrainement> {
        self.inner.repository()
    }

    pub fn entrainement_exercice(&self) -> Repository<EntrainementExercice> {
        self.inner.repository()
    }

    pub fn echauffement(&self) -> Repository<Echauffement> {
        self.inner.repository()
    }

    pub fn bloc_echauffement(&self) -> Repository<BlocEchauffement> {
        self.inner.repository()
    }

    pub fn situation_match(&self) -> Repository<SituationMatch> {
        self.inner.repository()
    }

    pub fn user(&self) -> Repository<User> {
        self.inner.repository()
    }

    /// Interactive transaction over the typed repositories
    pub async fn transaction<F, Fut, R>(&self, body: F) -> OrmResult<R>
    where
        F: FnOnce(CourtsideTransaction) -> Fut,
        Fut: std::future::Future<Output = OrmResult<R>>,
    {
        self.inner
            .transaction(|tx| body(CourtsideTransaction { inner: tx }))
            .await
    }

    pub async fn transaction_with<F, Fut, R>(
        &self,
        options: TransactionOptions,
        body: F,
    ) -> OrmResult<R>
    where
        F: FnOnce(CourtsideTransaction) -> Fut,
        Fut: std::future::Future<Output = OrmResult<R>>,
    {
        self.inner
            .transaction_with(options, |tx| body(CourtsideTransaction { inner: tx }))
            .await
    }

    // Relation accessors. To-one accessors return None for a null foreign
    // key; list accessors take the same filter/sort/pagination surface as
    // findMany on the target entity.

    pub async fn echauffement_of(
        &self,
        entrainement: &Entrainement,
    ) -> OrmResult<Option<Echauffement>> {
        self.entrainement()
            .related_one(entrainement, "echauffement")
            .await
    }

    pub async fn situation_match_of(
        &self,
        entrainement: &Entrainement,
    ) -> OrmResult<Option<SituationMatch>> {
        self.entrainement()
            .related_one(entrainement, "situation_match")
            .await
    }

    pub async fn blocs_of(
        &self,
        echauffement: &Echauffement,
        args: FindManyArgs,
    ) -> OrmResult<Vec<BlocEchauffement>> {
        self.echauffement().related(echauffement, "blocs", args).await
    }

    pub async fn exercices_of(
        &self,
        entrainement: &Entrainement,
        args: FindManyArgs,
    ) -> OrmResult<Vec<EntrainementExercice>> {
        self.entrainement()
            .related(entrainement, "exercice_links", args)
            .await
    }

    pub async fn entrainements_of_echauffement(
        &self,
        echauffement: &Echauffement,
        args: FindManyArgs,
    ) -> OrmResult<Vec<Entrainement>> {
        self.echauffement()
            .related(echauffement, "entrainements", args)
            .await
    }

    pub async fn entrainements_of_situation(
        &self,
        situation: &SituationMatch,
        args: FindManyArgs,
    ) -> OrmResult<Vec<Entrainement>> {
        self.situation_match()
            .related(situation, "entrainements", args)
            .await
    }

    pub async fn tags_of_exercice(
        &self,
        exercice: &Exercice,
        args: FindManyArgs,
    ) -> OrmResult<Vec<Tag>> {
        self.exercice().related(exercice, "tags", args).await
    }

    pub async fn tags_of_entrainement(
        &self,
        entrainement: &Entrainement,
        args: FindManyArgs,
    ) -> OrmResult<Vec<Tag>> {
        self.entrainement().related(entrainement, "tags", args).await
    }

    pub async fn tags_of_situation(
        &self,
        situation: &SituationMatch,
        args: FindManyArgs,
    ) -> OrmResult<Vec<Tag>> {
        self.situation_match().related(situation, "tags", args).await
    }

    // Tag attachment over the implicit join tables; idempotent both ways.

    pub async fn tag_exercice(&self, exercice: &Exercice, tag_id: &str) -> OrmResult<()> {
        self.exercice().link(exercice, "tags", tag_id).await
    }

    pub async fn untag_exercice(&self, exercice: &Exercice, tag_id: &str) -> OrmResult<()> {
        self.exercice().unlink(exercice, "tags", tag_id).await
    }

    pub async fn tag_entrainement(
        &self,
        entrainement: &Entrainement,
        tag_id: &str,
    ) -> OrmResult<()> {
        self.entrainement().link(entrainement, "tags", tag_id).await
    }

    pub async fn untag_entrainement(
        &self,
        entrainement: &Entrainement,
        tag_id: &str,
    ) -> OrmResult<()> {
        self.entrainement().unlink(entrainement, "tags", tag_id).await
    }

    pub async fn tag_situation(&self, situation: &SituationMatch, tag_id: &str) -> OrmResult<()> {
        self.situation_match().link(situation, "tags", tag_id).await
    }

    pub async fn untag_situation(
        &self,
        situation: &SituationMatch,
        tag_id: &str,
    ) -> OrmResult<()> {
        self.situation_match().unlink(situation, "tags", tag_id).await
    }
}

/// Typed repositories bound to one live transaction
pub struct CourtsideTransaction {
    inner: TransactionClient,
}

impl CourtsideTransaction {
    pub fn inner(&self) -> &TransactionClient {
        &self.inner
    }

    pub fn exercice(&self) -> Repository<Exercice> {
        self.inner.repository()
    }

    pub fn tag(&self) -> Repository<Tag> {
        self.inner.repository()
    }

    pub fn entrainement(&self) -> Repository<Entrainement> {
        self.inner.repository()
    }

    pub fn entrainement_exercice(&self) -> Repository<EntrainementExercice> {
        self.inner.repository()
    }

    pub fn echauffement(&self) -> Repository<Echauffement> {
        self.inner.repository()
    }

    pub fn bloc_echauffement(&self) -> Repository<BlocEchauffement> {
        self.inner.repository()
    }

    pub fn situation_match(&self) -> Repository<SituationMatch> {
        self.inner.repository()
    }

    pub fn user(&self) -> Repository<User> {
        self.inner.repository()
    }
}
