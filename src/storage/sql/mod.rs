//! Unified SQL storage implementation.
//!
//! Shared by the SQL backends (SQLite, PostgreSQL). Statements are built
//! once in [`query`] and rendered per backend; rows decode through the
//! records in [`records`]. A macro generates the [`CustodyTx`] impl for each
//! backend, differing only in query builder and row locking.
//!
//! [`CustodyTx`]: crate::storage::CustodyTx

pub(crate) mod query;
pub(crate) mod records;

/// An open SQL transaction.
///
/// Dropping it without calling `commit` rolls back.
pub struct SqlTx<DB: sqlx::Database> {
    tx: sqlx::Transaction<'static, DB>,
    writable: bool,
}

impl<DB: sqlx::Database> SqlTx<DB> {
    pub(crate) fn new(tx: sqlx::Transaction<'static, DB>, writable: bool) -> Self {
        Self { tx, writable }
    }
}

/// Macro to implement CustodyTx for a specific SQL backend.
///
/// The `row_locks` parameter controls whether writable transactions take
/// explicit locks (true for PostgreSQL, which locks the property row and the
/// ledger head; false for SQLite, where `BEGIN IMMEDIATE` already holds the
/// database write lock).
macro_rules! impl_custody_tx {
    ($db_type:ty, $builder:ident, $feature:literal, row_locks: $row_locks:literal) => {
        #[cfg(feature = $feature)]
        #[async_trait::async_trait]
        impl crate::storage::CustodyTx for SqlTx<$db_type> {
            async fn ledger_head(&mut self) -> crate::storage::Result<Option<String>> {
                if $row_locks && self.writable {
                    sqlx::query("SELECT pg_advisory_xact_lock($1)")
                        .bind(crate::storage::schema::LEDGER_LOCK_KEY)
                        .execute(&mut *self.tx)
                        .await?;
                }
                let sql = query::ledger_head().to_string(sea_query::$builder);
                let head: Option<String> = sqlx::query_scalar(&sql)
                    .fetch_optional(&mut *self.tx)
                    .await?;
                Ok(head)
            }

            async fn insert_event(
                &mut self,
                event: &crate::custody::SealedEvent,
            ) -> crate::storage::Result<crate::custody::EventId> {
                let sql = query::insert_event(event).to_string(sea_query::$builder);
                let id: i64 = sqlx::query_scalar(&sql).fetch_one(&mut *self.tx).await?;
                Ok(crate::custody::EventId(id))
            }

            async fn event(
                &mut self,
                id: crate::custody::EventId,
            ) -> crate::storage::Result<Option<crate::custody::LedgerEvent>> {
                let sql = query::event(id).to_string(sea_query::$builder);
                sqlx::query_as::<_, records::LedgerEventRecord>(&sql)
                    .fetch_optional(&mut *self.tx)
                    .await?
                    .map(crate::custody::LedgerEvent::try_from)
                    .transpose()
            }

            async fn previous_event(
                &mut self,
                id: crate::custody::EventId,
            ) -> crate::storage::Result<Option<crate::custody::LedgerEvent>> {
                let sql = query::previous_event(id).to_string(sea_query::$builder);
                sqlx::query_as::<_, records::LedgerEventRecord>(&sql)
                    .fetch_optional(&mut *self.tx)
                    .await?
                    .map(crate::custody::LedgerEvent::try_from)
                    .transpose()
            }

            async fn property_events(
                &mut self,
                property: crate::custody::PropertyId,
                after: Option<crate::custody::EventId>,
                limit: Option<u32>,
            ) -> crate::storage::Result<Vec<crate::custody::LedgerEvent>> {
                let sql =
                    query::property_events(property, after, limit).to_string(sea_query::$builder);
                sqlx::query_as::<_, records::LedgerEventRecord>(&sql)
                    .fetch_all(&mut *self.tx)
                    .await?
                    .into_iter()
                    .map(crate::custody::LedgerEvent::try_from)
                    .collect()
            }

            async fn events_after(
                &mut self,
                after: Option<crate::custody::EventId>,
                limit: u32,
            ) -> crate::storage::Result<Vec<crate::custody::LedgerEvent>> {
                let sql = query::events_after(after, limit).to_string(sea_query::$builder);
                sqlx::query_as::<_, records::LedgerEventRecord>(&sql)
                    .fetch_all(&mut *self.tx)
                    .await?
                    .into_iter()
                    .map(crate::custody::LedgerEvent::try_from)
                    .collect()
            }

            async fn recent_events(
                &mut self,
                limit: u32,
            ) -> crate::storage::Result<Vec<crate::custody::LedgerEvent>> {
                let sql = query::recent_events(limit).to_string(sea_query::$builder);
                sqlx::query_as::<_, records::LedgerEventRecord>(&sql)
                    .fetch_all(&mut *self.tx)
                    .await?
                    .into_iter()
                    .map(crate::custody::LedgerEvent::try_from)
                    .collect()
            }

            async fn property(
                &mut self,
                id: crate::custody::PropertyId,
            ) -> crate::storage::Result<Option<crate::custody::Property>> {
                // Statements are !Send; render before the first await.
                let sql = {
                    let mut stmt = query::property(id);
                    if $row_locks && self.writable {
                        stmt.lock(sea_query::LockType::Update);
                    }
                    stmt.to_string(sea_query::$builder)
                };
                sqlx::query_as::<_, records::PropertyRecord>(&sql)
                    .fetch_optional(&mut *self.tx)
                    .await?
                    .map(crate::custody::Property::try_from)
                    .transpose()
            }

            async fn property_by_serial(
                &mut self,
                serial_number: &str,
            ) -> crate::storage::Result<Option<crate::custody::Property>> {
                let sql = query::property_by_serial(serial_number).to_string(sea_query::$builder);
                sqlx::query_as::<_, records::PropertyRecord>(&sql)
                    .fetch_optional(&mut *self.tx)
                    .await?
                    .map(crate::custody::Property::try_from)
                    .transpose()
            }

            async fn insert_property(
                &mut self,
                property: &crate::custody::Property,
            ) -> crate::storage::Result<()> {
                let sql = query::insert_property(property).to_string(sea_query::$builder);
                sqlx::query(&sql).execute(&mut *self.tx).await?;
                Ok(())
            }

            async fn update_property(
                &mut self,
                property: &crate::custody::Property,
            ) -> crate::storage::Result<()> {
                let sql = query::update_property(property).to_string(sea_query::$builder);
                sqlx::query(&sql).execute(&mut *self.tx).await?;
                Ok(())
            }

            async fn credential(
                &mut self,
                id: crate::custody::CredentialId,
            ) -> crate::storage::Result<Option<crate::custody::Credential>> {
                let sql = query::credential(id).to_string(sea_query::$builder);
                sqlx::query_as::<_, records::CredentialRecord>(&sql)
                    .fetch_optional(&mut *self.tx)
                    .await?
                    .map(crate::custody::Credential::try_from)
                    .transpose()
            }

            async fn active_credential(
                &mut self,
                property: crate::custody::PropertyId,
            ) -> crate::storage::Result<Option<crate::custody::Credential>> {
                let sql = query::active_credential(property).to_string(sea_query::$builder);
                sqlx::query_as::<_, records::CredentialRecord>(&sql)
                    .fetch_optional(&mut *self.tx)
                    .await?
                    .map(crate::custody::Credential::try_from)
                    .transpose()
            }

            async fn credentials_for(
                &mut self,
                property: crate::custody::PropertyId,
            ) -> crate::storage::Result<Vec<crate::custody::Credential>> {
                let sql = query::credentials_for(property).to_string(sea_query::$builder);
                sqlx::query_as::<_, records::CredentialRecord>(&sql)
                    .fetch_all(&mut *self.tx)
                    .await?
                    .into_iter()
                    .map(crate::custody::Credential::try_from)
                    .collect()
            }

            async fn insert_credential(
                &mut self,
                credential: &crate::custody::Credential,
            ) -> crate::storage::Result<()> {
                let sql = query::insert_credential(credential).to_string(sea_query::$builder);
                sqlx::query(&sql).execute(&mut *self.tx).await?;
                Ok(())
            }

            async fn update_credential(
                &mut self,
                credential: &crate::custody::Credential,
            ) -> crate::storage::Result<()> {
                let sql = query::update_credential(credential).to_string(sea_query::$builder);
                sqlx::query(&sql).execute(&mut *self.tx).await?;
                Ok(())
            }

            async fn transfer(
                &mut self,
                id: crate::custody::TransferId,
            ) -> crate::storage::Result<Option<crate::custody::Transfer>> {
                let sql = query::transfer(id).to_string(sea_query::$builder);
                sqlx::query_as::<_, records::TransferRecord>(&sql)
                    .fetch_optional(&mut *self.tx)
                    .await?
                    .map(crate::custody::Transfer::try_from)
                    .transpose()
            }

            async fn pending_transfer(
                &mut self,
                property: crate::custody::PropertyId,
            ) -> crate::storage::Result<Option<crate::custody::Transfer>> {
                let sql = query::pending_transfer(property).to_string(sea_query::$builder);
                sqlx::query_as::<_, records::TransferRecord>(&sql)
                    .fetch_optional(&mut *self.tx)
                    .await?
                    .map(crate::custody::Transfer::try_from)
                    .transpose()
            }

            async fn transfers_for_property(
                &mut self,
                property: crate::custody::PropertyId,
            ) -> crate::storage::Result<Vec<crate::custody::Transfer>> {
                let sql = query::transfers_for_property(property).to_string(sea_query::$builder);
                sqlx::query_as::<_, records::TransferRecord>(&sql)
                    .fetch_all(&mut *self.tx)
                    .await?
                    .into_iter()
                    .map(crate::custody::Transfer::try_from)
                    .collect()
            }

            async fn transfers_for_actor(
                &mut self,
                actor: crate::custody::ActorId,
            ) -> crate::storage::Result<Vec<crate::custody::Transfer>> {
                let sql = query::transfers_for_actor(actor).to_string(sea_query::$builder);
                sqlx::query_as::<_, records::TransferRecord>(&sql)
                    .fetch_all(&mut *self.tx)
                    .await?
                    .into_iter()
                    .map(crate::custody::Transfer::try_from)
                    .collect()
            }

            async fn insert_transfer(
                &mut self,
                transfer: &crate::custody::Transfer,
            ) -> crate::storage::Result<()> {
                let sql = query::insert_transfer(transfer).to_string(sea_query::$builder);
                sqlx::query(&sql).execute(&mut *self.tx).await?;
                Ok(())
            }

            async fn update_transfer(
                &mut self,
                transfer: &crate::custody::Transfer,
            ) -> crate::storage::Result<()> {
                let sql = query::update_transfer(transfer).to_string(sea_query::$builder);
                sqlx::query(&sql).execute(&mut *self.tx).await?;
                Ok(())
            }

            async fn insert_correction(
                &mut self,
                correction: &crate::custody::CorrectionEvent,
            ) -> crate::storage::Result<()> {
                let sql = query::insert_correction(correction).to_string(sea_query::$builder);
                sqlx::query(&sql).execute(&mut *self.tx).await?;
                Ok(())
            }

            async fn correction(
                &mut self,
                id: crate::custody::CorrectionId,
            ) -> crate::storage::Result<Option<crate::custody::CorrectionEvent>> {
                let sql = query::correction(id).to_string(sea_query::$builder);
                sqlx::query_as::<_, records::CorrectionRecord>(&sql)
                    .fetch_optional(&mut *self.tx)
                    .await?
                    .map(crate::custody::CorrectionEvent::try_from)
                    .transpose()
            }

            async fn corrections_for(
                &mut self,
                event: crate::custody::EventId,
            ) -> crate::storage::Result<Vec<crate::custody::CorrectionEvent>> {
                let sql = query::corrections_for(event).to_string(sea_query::$builder);
                sqlx::query_as::<_, records::CorrectionRecord>(&sql)
                    .fetch_all(&mut *self.tx)
                    .await?
                    .into_iter()
                    .map(crate::custody::CorrectionEvent::try_from)
                    .collect()
            }

            async fn all_corrections(
                &mut self,
            ) -> crate::storage::Result<Vec<crate::custody::CorrectionEvent>> {
                let sql = query::all_corrections().to_string(sea_query::$builder);
                sqlx::query_as::<_, records::CorrectionRecord>(&sql)
                    .fetch_all(&mut *self.tx)
                    .await?
                    .into_iter()
                    .map(crate::custody::CorrectionEvent::try_from)
                    .collect()
            }

            async fn insert_verification(
                &mut self,
                verification: &crate::custody::VerificationEvent,
            ) -> crate::storage::Result<()> {
                let sql = query::insert_verification(verification).to_string(sea_query::$builder);
                sqlx::query(&sql).execute(&mut *self.tx).await?;
                Ok(())
            }

            async fn verifications_for(
                &mut self,
                property: crate::custody::PropertyId,
            ) -> crate::storage::Result<Vec<crate::custody::VerificationEvent>> {
                let sql = query::verifications_for(property).to_string(sea_query::$builder);
                sqlx::query_as::<_, records::VerificationRecord>(&sql)
                    .fetch_all(&mut *self.tx)
                    .await?
                    .into_iter()
                    .map(crate::custody::VerificationEvent::try_from)
                    .collect()
            }

            async fn attachment(
                &mut self,
                component: crate::custody::PropertyId,
            ) -> crate::storage::Result<Option<crate::custody::ComponentAttachment>> {
                let sql = query::attachment(component).to_string(sea_query::$builder);
                sqlx::query_as::<_, records::AttachmentRecord>(&sql)
                    .fetch_optional(&mut *self.tx)
                    .await?
                    .map(crate::custody::ComponentAttachment::try_from)
                    .transpose()
            }

            async fn components_of(
                &mut self,
                parent: crate::custody::PropertyId,
            ) -> crate::storage::Result<Vec<crate::custody::ComponentAttachment>> {
                let sql = query::components_of(parent).to_string(sea_query::$builder);
                sqlx::query_as::<_, records::AttachmentRecord>(&sql)
                    .fetch_all(&mut *self.tx)
                    .await?
                    .into_iter()
                    .map(crate::custody::ComponentAttachment::try_from)
                    .collect()
            }

            async fn insert_attachment(
                &mut self,
                attachment: &crate::custody::ComponentAttachment,
            ) -> crate::storage::Result<()> {
                let sql = query::insert_attachment(attachment).to_string(sea_query::$builder);
                sqlx::query(&sql).execute(&mut *self.tx).await?;
                Ok(())
            }

            async fn delete_attachment(
                &mut self,
                component: crate::custody::PropertyId,
            ) -> crate::storage::Result<()> {
                let sql = query::delete_attachment(component).to_string(sea_query::$builder);
                sqlx::query(&sql).execute(&mut *self.tx).await?;
                Ok(())
            }

            async fn commit(self) -> crate::storage::Result<()> {
                self.tx.commit().await?;
                Ok(())
            }
        }
    };
}

impl_custody_tx!(sqlx::Sqlite, SqliteQueryBuilder, "sqlite", row_locks: false);
impl_custody_tx!(sqlx::Postgres, PostgresQueryBuilder, "postgres", row_locks: true);
