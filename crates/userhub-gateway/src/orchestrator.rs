//! Client side of the `QueryUsers` pagination protocol.
//!
//! A [`QueryOrchestrator`] turns a collection size into page descriptors,
//! pushes all of them through a [`stream_channel`] before the call starts, and
//! then drains the chunk stream the auth service answers with. Chunks carry no
//! page number: the n-th chunk answers the n-th descriptor.

use core::pin::Pin;
use core::time::Duration;
use tokio::sync::{Semaphore, oneshot};
use tokio::time::timeout;
use tokio_stream::{Stream, StreamExt};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tonic::{Status, transport::Channel};
use userhub_core::{
    Error, Result,
    channel::{StreamSubscriber, stream_channel},
    pagination::{PageCursor, PageDescriptor},
    proto::{PaginationDto, Users, users_service_client::UsersServiceClient},
    session::StreamSession,
};

pub type PageRequests = Pin<Box<dyn Stream<Item = PaginationDto> + Send + 'static>>;
pub type PageResponses =
    Pin<Box<dyn Stream<Item = core::result::Result<Users, Status>> + Send + 'static>>;

/// Opens one bidirectional pagination call.
#[tonic::async_trait]
pub trait PageTransport: Send {
    async fn query_pages(
        &mut self,
        requests: PageRequests,
    ) -> core::result::Result<PageResponses, Status>;
}

#[tonic::async_trait]
impl PageTransport for UsersServiceClient<Channel> {
    async fn query_pages(
        &mut self,
        requests: PageRequests,
    ) -> core::result::Result<PageResponses, Status> {
        let call: Pin<
            Box<
                dyn Future<
                        Output = core::result::Result<
                            tonic::Response<tonic::Streaming<Users>>,
                            Status,
                        >,
                    > + Send
                    + '_,
            >,
        > = Box::pin(self.query_users(requests));
        let responses = call.await?.into_inner();
        Ok(Box::pin(responses))
    }
}

/// What a finished query session received.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QuerySummary {
    pub chunks: u64,
    pub users: usize,
    pub chunk_sizes: Vec<usize>,
}

pub struct QueryOrchestrator<T> {
    transport: T,
    session_timeout: Duration,
}

impl<T: PageTransport> QueryOrchestrator<T> {
    /// `session_timeout` bounds the wait for each individual chunk.
    pub const fn new(transport: T, session_timeout: Duration) -> Self {
        Self {
            transport,
            session_timeout,
        }
    }

    /// Pages over `total_items` users, `page_size` at a time.
    pub async fn run(&mut self, total_items: usize, page_size: u32) -> Result<QuerySummary> {
        let mut session = StreamSession::new();
        self.run_in(&mut session, total_items, page_size).await
    }

    /// Same as [`run`](Self::run), recording the lifecycle in `session`.
    ///
    /// On success the session ends `Closed { failed: false }`; on any error it
    /// ends `Closed { failed: true }`.
    #[tracing::instrument(skip(self, session))]
    pub async fn run_in(
        &mut self,
        session: &mut StreamSession,
        total_items: usize,
        page_size: u32,
    ) -> Result<QuerySummary> {
        let (cursor, requests) = match Self::submit(session, total_items, page_size).await {
            Ok(opened) => opened,
            Err(e) => {
                session.fail();
                return Err(e);
            }
        };
        self.drive(session, requests, &cursor).await
    }

    /// Pushes every descriptor and completes the request direction.
    ///
    /// The pipe holds the whole request stream plus its completion, so this
    /// never waits on the server.
    async fn submit(
        session: &mut StreamSession,
        total_items: usize,
        page_size: u32,
    ) -> Result<(PageCursor, StreamSubscriber<PageDescriptor>)> {
        let cursor = PageCursor::new(total_items, page_size)?;
        let (mut producer, subscriber) = stream_channel(request_capacity(&cursor)?);

        for descriptor in &cursor {
            producer.send(descriptor).await?;
        }
        producer.complete().await?;
        session.close_requests()?;

        tracing::debug!(
            "Submitted {} page descriptors for {} users",
            producer.sent(),
            total_items
        );
        Ok((cursor, subscriber))
    }

    async fn drive(
        &mut self,
        session: &mut StreamSession,
        requests: StreamSubscriber<PageDescriptor>,
        cursor: &PageCursor,
    ) -> Result<QuerySummary> {
        let result = self
            .exchange(session, requests, cursor)
            .await
            .and_then(|summary| session.finish().map(|()| summary));

        if result.is_err() {
            session.fail();
        }
        result
    }

    async fn exchange(
        &mut self,
        session: &mut StreamSession,
        requests: StreamSubscriber<PageDescriptor>,
        cursor: &PageCursor,
    ) -> Result<QuerySummary> {
        // The wire stream only carries descriptors. An inbound failure is
        // handed back here and the wire stream is left open, so the server
        // sees the call cancelled rather than a clean end of requests.
        let (failure_tx, mut failure_rx) = oneshot::channel::<Error>();
        let requests = futures::stream::unfold(
            (requests, failure_tx),
            |(mut requests, failure_tx)| async move {
                match requests.next().await? {
                    Ok(descriptor) => {
                        Some((PaginationDto::from(descriptor), (requests, failure_tx)))
                    }
                    Err(e) => {
                        let _ = failure_tx.send(e);
                        core::future::pending().await
                    }
                }
            },
        );

        let mut responses = self
            .transport
            .query_pages(Box::pin(requests))
            .await
            .map_err(|status| Error::from_stream_status(&status))?;

        let mut summary = QuerySummary::default();
        let mut requests_live = true;

        loop {
            tokio::select! {
                biased;
                failure = &mut failure_rx, if requests_live => match failure {
                    Ok(e) => {
                        tracing::warn!("Request stream failed, abandoning call: {e}");
                        return Err(e);
                    }
                    // Request stream finished without error.
                    Err(_) => requests_live = false,
                },
                next = timeout(self.session_timeout, responses.next()) => match next {
                    Err(_) => return Err(Error::SessionTimeout),
                    Ok(None) => break,
                    Ok(Some(Err(status))) => return Err(Error::from_stream_status(&status)),
                    Ok(Some(Ok(chunk))) => {
                        let n = session.record_chunk()?;
                        tracing::debug!(
                            "Paging {} on {} users, chunk number: {n}",
                            cursor.page_size(),
                            cursor.total_items()
                        );
                        tracing::info!(?chunk);

                        summary.chunks = n;
                        summary.users += chunk.users.len();
                        summary.chunk_sizes.push(chunk.users.len());
                    }
                },
            }
        }

        Ok(summary)
    }
}

/// Background orchestrator runs, drained and then cancelled on shutdown.
#[derive(Clone, Default)]
pub struct QueryRuns {
    tasks: TaskTracker,
    cancel: CancellationToken,
}

impl QueryRuns {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts `orchestrator` over `total_items` users in the background.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ServiceShutdown`] once [`shutdown`](Self::shutdown)
    /// has begun.
    pub fn spawn<T>(
        &self,
        mut orchestrator: QueryOrchestrator<T>,
        total_items: usize,
        page_size: u32,
    ) -> Result<()>
    where
        T: PageTransport + 'static,
    {
        if self.tasks.is_closed() {
            return Err(Error::ServiceShutdown);
        }

        let cancel = self.cancel.clone();
        self.tasks.spawn(async move {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    tracing::warn!("Query session cancelled by shutdown");
                }
                result = orchestrator.run(total_items, page_size) => match result {
                    Ok(summary) => tracing::info!(
                        "Query session delivered {} users in {} chunks",
                        summary.users,
                        summary.chunks
                    ),
                    Err(e) => tracing::error!("Query session failed: {e}"),
                },
            }
        });
        Ok(())
    }

    /// Number of runs still in progress.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Refuses new runs, waits up to `drain_timeout` for the live ones, then
    /// cancels whatever is left.
    pub async fn shutdown(&self, drain_timeout: Duration) {
        self.tasks.close();
        tracing::info!("Draining {} query sessions", self.tasks.len());

        if timeout(drain_timeout, self.tasks.wait()).await.is_err() {
            tracing::warn!(
                "Drain timed out, cancelling {} query sessions",
                self.tasks.len()
            );
            self.cancel.cancel();
            self.tasks.wait().await;
        }
    }
}

/// Signals needed to hold every descriptor plus the completion.
fn request_capacity(cursor: &PageCursor) -> Result<usize> {
    usize::try_from(cursor.total_pages())
        .ok()
        .and_then(|pages| pages.checked_add(1))
        .filter(|&capacity| capacity <= Semaphore::MAX_PERMITS)
        .ok_or_else(|| Error::InvalidDescriptor {
            reason: format!("{} pages cannot be buffered", cursor.total_pages()),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;
    use tokio_stream::wrappers::ReceiverStream;
    use userhub_core::{proto::User, session::SessionState};

    /// Answers each descriptor with a slice of `users`, like the auth service
    /// over an unmutated store.
    struct SliceTransport {
        users: Vec<User>,
        fail_after: Option<usize>,
        // Fired once the request stream ends cleanly.
        requests_ended: Option<oneshot::Sender<()>>,
    }

    impl SliceTransport {
        fn new(n: usize) -> Self {
            let users = (0..n)
                .map(|i| User {
                    id: i.to_string(),
                    username: format!("user-{i}"),
                    ..User::default()
                })
                .collect();
            Self {
                users,
                fail_after: None,
                requests_ended: None,
            }
        }

        fn watching_requests(n: usize) -> (Self, oneshot::Receiver<()>) {
            let (tx, rx) = oneshot::channel();
            let transport = Self {
                requests_ended: Some(tx),
                ..Self::new(n)
            };
            (transport, rx)
        }
    }

    #[tonic::async_trait]
    impl PageTransport for SliceTransport {
        async fn query_pages(
            &mut self,
            mut requests: PageRequests,
        ) -> core::result::Result<PageResponses, Status> {
            let (tx, rx) = mpsc::channel(4);
            let users = self.users.clone();
            let fail_after = self.fail_after;
            let requests_ended = self.requests_ended.take();
            tokio::spawn(async move {
                let mut sent = 0;
                while let Some(dto) = requests.next().await {
                    if fail_after == Some(sent) {
                        let _ = tx.send(Err(Status::internal("store exploded"))).await;
                        return;
                    }
                    let chunk = match PageDescriptor::try_from(dto) {
                        Ok(d) => Ok(Users {
                            users: users[d.bounds(users.len())].to_vec(),
                        }),
                        Err(e) => Err(Status::from(e)),
                    };
                    if tx.send(chunk).await.is_err() {
                        return;
                    }
                    sent += 1;
                }
                if let Some(ended) = requests_ended {
                    let _ = ended.send(());
                }
            });
            Ok(Box::pin(ReceiverStream::new(rx)))
        }
    }

    /// Accepts the call and never answers.
    struct SilentTransport;

    #[tonic::async_trait]
    impl PageTransport for SilentTransport {
        async fn query_pages(
            &mut self,
            _requests: PageRequests,
        ) -> core::result::Result<PageResponses, Status> {
            Ok(Box::pin(tokio_stream::pending::<
                core::result::Result<Users, Status>,
            >()))
        }
    }

    fn orchestrator<T: PageTransport>(transport: T) -> QueryOrchestrator<T> {
        QueryOrchestrator::new(transport, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn ten_users_in_pages_of_four() {
        let (transport, requests_ended) = SliceTransport::watching_requests(10);
        let mut session = StreamSession::new();
        let summary = orchestrator(transport)
            .run_in(&mut session, 10, 4)
            .await
            .unwrap();
        assert_eq!(requests_ended.await, Ok(()));

        assert_eq!(summary.chunks, 3);
        assert_eq!(summary.chunk_sizes, vec![4, 4, 2]);
        assert_eq!(summary.users, 10);
        assert_eq!(session.chunks(), 3);
        assert_eq!(session.state(), SessionState::Closed { failed: false });
    }

    #[tokio::test]
    async fn seven_users_in_pages_of_three() {
        let summary = orchestrator(SliceTransport::new(7)).run(7, 3).await.unwrap();
        assert_eq!(summary.chunk_sizes, vec![3, 3, 1]);
    }

    #[tokio::test]
    async fn repeated_runs_agree() {
        let mut orchestrator = orchestrator(SliceTransport::new(23));
        let first = orchestrator.run(23, 5).await.unwrap();
        let second = orchestrator.run(23, 5).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn empty_collection_yields_no_chunks() {
        let mut session = StreamSession::new();
        let summary = orchestrator(SliceTransport::new(0))
            .run_in(&mut session, 0, 50)
            .await
            .unwrap();

        assert_eq!(summary, QuerySummary::default());
        assert_eq!(session.state(), SessionState::Closed { failed: false });
    }

    #[tokio::test]
    async fn zero_page_size_fails_before_calling() {
        let mut session = StreamSession::new();
        let err = orchestrator(SilentTransport)
            .run_in(&mut session, 10, 0)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::InvalidDescriptor { .. }));
        assert_eq!(session.state(), SessionState::Closed { failed: true });
    }

    #[tokio::test]
    async fn server_error_ends_the_session() {
        let transport = SliceTransport {
            fail_after: Some(1),
            ..SliceTransport::new(10)
        };
        let mut session = StreamSession::new();
        let err = orchestrator(transport)
            .run_in(&mut session, 10, 4)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::StreamProtocol { .. }));
        assert_eq!(session.chunks(), 1);
        assert_eq!(session.state(), SessionState::Closed { failed: true });
    }

    #[tokio::test]
    async fn silent_server_times_out() {
        let mut orchestrator = QueryOrchestrator::new(SilentTransport, Duration::from_millis(50));
        let mut session = StreamSession::new();
        let err = orchestrator.run_in(&mut session, 10, 4).await.unwrap_err();

        assert_eq!(err, Error::SessionTimeout);
        assert_eq!(session.state(), SessionState::Closed { failed: true });
    }

    #[tokio::test]
    async fn request_failure_abandons_the_call() {
        let cursor = PageCursor::new(20, 4).unwrap();
        let (mut producer, subscriber) = stream_channel(8);
        for descriptor in cursor.iter().take(2) {
            producer.send(descriptor).await.unwrap();
        }
        producer
            .fail(Error::ChannelError {
                context: "descriptor source crashed".to_string(),
            })
            .await
            .unwrap();

        let (transport, requests_ended) = SliceTransport::watching_requests(20);
        let mut session = StreamSession::new();
        let err = orchestrator(transport)
            .drive(&mut session, subscriber, &cursor)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::ChannelError { .. }));
        assert!(session.chunks() <= 2);
        assert_eq!(session.state(), SessionState::Closed { failed: true });

        // The truncated request stream must never reach the server as a clean
        // end of requests.
        let ended = tokio::time::timeout(Duration::from_millis(200), requests_ended).await;
        assert!(ended.is_err());
    }

    #[tokio::test]
    async fn finished_runs_drain_without_cancelling() {
        let runs = QueryRuns::new();
        runs.spawn(orchestrator(SliceTransport::new(10)), 10, 4).unwrap();

        runs.shutdown(Duration::from_secs(5)).await;
        assert_eq!(runs.len(), 0);
        assert!(!runs.cancel.is_cancelled());
    }

    #[tokio::test]
    async fn stuck_runs_are_cancelled_after_the_drain_period() {
        let runs = QueryRuns::new();
        let stuck = QueryOrchestrator::new(SilentTransport, Duration::from_secs(60));
        runs.spawn(stuck, 10, 4).unwrap();
        assert_eq!(runs.len(), 1);

        tokio::time::timeout(Duration::from_secs(2), runs.shutdown(Duration::from_millis(50)))
            .await
            .expect("shutdown must not wait for the session timeout");
        assert_eq!(runs.len(), 0);
        assert!(runs.cancel.is_cancelled());

        let refused = runs.spawn(orchestrator(SilentTransport), 10, 4);
        assert_eq!(refused, Err(Error::ServiceShutdown));
    }

    #[test]
    fn request_capacity_covers_completion() {
        assert_eq!(request_capacity(&PageCursor::new(10, 4).unwrap()), Ok(4));
        assert_eq!(request_capacity(&PageCursor::new(0, 4).unwrap()), Ok(1));
    }

    #[test]
    fn unbufferable_page_counts_are_rejected() {
        let cursor = PageCursor::new(u32::MAX as usize, 1).unwrap();
        let capacity = request_capacity(&cursor);
        if u32::MAX as usize >= Semaphore::MAX_PERMITS {
            assert!(matches!(capacity, Err(Error::InvalidDescriptor { .. })));
        } else {
            assert_eq!(capacity, Ok(u32::MAX as usize + 1));
        }
    }
}
