//! gRPC service implementation for user management and streaming pagination.
//!
//! This module defines [`AuthService`], the concrete implementation of the
//! [`UsersService`] gRPC service defined in `auth.proto`.
//!
//! ## Responsibilities
//!
//! - Answer the unary CRUD calls from the shared [`UserStore`].
//! - Spawn one task per `QueryUsers` call that runs [`serve_pages`].
//! - Handle backpressure, cancellation, and graceful shutdown.

use crate::server::{
    config::ServerConfig,
    store::UserStore,
    streaming::{coordinator::serve_pages, tracker::SessionTracker},
    telemetry::{
        decrement_sessions_inflight, increment_chunks_sent, increment_requests,
        increment_sessions_inflight, increment_stream_errors, record_session_duration,
        record_users_per_chunk,
    },
};
use core::pin::Pin;
use futures::{StreamExt, TryStreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::{Stream, wrappers::ReceiverStream};
use tonic::{Request, Response, Status, Streaming};
use userhub_core::{
    Error,
    pagination::PageDescriptor,
    proto::{
        CreateUserDto, Empty, FindOneUserDto, PaginationDto, UpdateUserDto, User, Users,
        users_service_server::UsersService,
    },
};

/// gRPC user service backed by an in-memory [`UserStore`].
///
/// The store is shared by reference between the CRUD handlers and all
/// pagination sessions; there is no global state.
#[derive(Clone)]
pub struct AuthService {
    config: ServerConfig,
    store: Arc<UserStore>,
    sessions: Arc<SessionTracker>,
}

impl AuthService {
    pub fn new(config: ServerConfig, store: Arc<UserStore>) -> Self {
        let sessions = Arc::new(SessionTracker::new(config.shutdown_timeout));
        Self {
            config,
            store,
            sessions,
        }
    }

    /// Initiates a graceful shutdown of all pagination sessions.
    ///
    /// New sessions are refused, live ones get the configured drain period,
    /// and whatever remains is cancelled.
    pub async fn shutdown(&self) -> Result<(), Error> {
        self.sessions.shutdown().await
    }
}

#[tonic::async_trait]
impl UsersService for AuthService {
    type QueryUsersStream = Pin<Box<dyn Stream<Item = Result<Users, Status>> + Send>>;

    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, fields(username = %req.get_ref().username)))]
    async fn create_user(&self, req: Request<CreateUserDto>) -> Result<Response<User>, Status> {
        let user = self.store.create(req.into_inner());
        #[cfg(feature = "tracing")]
        tracing::debug!("Created user {}", user.id);
        Ok(Response::new(user))
    }

    async fn find_all_users(&self, _req: Request<Empty>) -> Result<Response<Users>, Status> {
        Ok(Response::new(Users {
            users: self.store.find_all(),
        }))
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, fields(id = %req.get_ref().id)))]
    async fn find_one_user(
        &self,
        req: Request<FindOneUserDto>,
    ) -> Result<Response<User>, Status> {
        Ok(Response::new(self.store.find_one(&req.get_ref().id)?))
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, fields(id = %req.get_ref().id)))]
    async fn update_user(&self, req: Request<UpdateUserDto>) -> Result<Response<User>, Status> {
        Ok(Response::new(self.store.update(req.into_inner())?))
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, fields(id = %req.get_ref().id)))]
    async fn remove_user(&self, req: Request<FindOneUserDto>) -> Result<Response<User>, Status> {
        Ok(Response::new(self.store.remove(&req.get_ref().id)?))
    }

    /// Handles a bidirectional pagination session.
    ///
    /// Each `PaginationDto` received is answered by one `Users` chunk, in
    /// order. The response stream completes once the request stream completes
    /// and every chunk has been sent; any error ends the session with a single
    /// error status.
    ///
    /// If `metrics` is enabled, emits telemetry for:
    /// - request rate
    /// - sessions in flight
    /// - session duration
    /// - chunks sent and users per chunk
    /// - stream errors
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    async fn query_users(
        &self,
        req: Request<Streaming<PaginationDto>>,
    ) -> Result<Response<Self::QueryUsersStream>, Status> {
        let start = std::time::Instant::now();
        let guard = self.sessions.begin().inspect_err(|_| {
            increment_stream_errors();
        })?;

        increment_requests();
        increment_sessions_inflight();

        let (resp_tx, resp_rx) =
            mpsc::channel::<Result<Users, Status>>(self.config.stream_buffer_size);

        let inbound = req.into_inner().map(|item| {
            item.map_err(|status| Error::from_stream_status(&status))
                .and_then(PageDescriptor::try_from)
        });

        let store = Arc::clone(&self.store);
        let config = self.config.clone();
        let shutdown = self.sessions.shutdown_token();

        let fut = async move {
            let _guard = guard;
            match serve_pages(inbound, store, resp_tx, config, shutdown).await {
                Ok(_chunks) => {
                    record_session_duration(start.elapsed().as_millis() as f64);
                    #[cfg(feature = "tracing")]
                    tracing::debug!("Session completed with {_chunks} chunks");
                }
                Err(_e) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!("Session ended early: {}", _e);
                }
            }
            decrement_sessions_inflight();
        };
        #[cfg(feature = "tracing")]
        let fut = {
            use tracing::Instrument;
            let span = tracing::info_span!("pagination_session");
            fut.instrument(span)
        };

        tokio::spawn(fut);

        let stream = ReceiverStream::new(resp_rx)
            .inspect_ok(|chunk| {
                increment_chunks_sent();
                record_users_per_chunk(chunk.users.len() as f64);
            })
            .inspect_err(|_e| {
                increment_stream_errors();
            });

        Ok(Response::new(Box::pin(stream)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use tokio::net::TcpListener;
    use tokio_stream::wrappers::TcpListenerStream;
    use tonic::{
        Code,
        transport::{Channel, Server},
    };
    use userhub_core::{
        pagination::PageCursor,
        proto::{users_service_client::UsersServiceClient, users_service_server::UsersServiceServer},
    };

    async fn spawn_server(store: Arc<UserStore>) -> (SocketAddr, AuthService) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let service = AuthService::new(ServerConfig::default(), store);
        let server = UsersServiceServer::new(service.clone());
        tokio::spawn(async move {
            Server::builder()
                .add_service(server)
                .serve_with_incoming(TcpListenerStream::new(listener))
                .await
                .unwrap();
        });
        (addr, service)
    }

    async fn connect(addr: SocketAddr) -> UsersServiceClient<Channel> {
        let channel = Channel::from_shared(format!("http://{addr}"))
            .unwrap()
            .connect()
            .await
            .unwrap();
        UsersServiceClient::new(channel)
    }

    fn store_with(n: usize) -> Arc<UserStore> {
        let store = UserStore::new();
        for i in 0..n {
            store.create(CreateUserDto {
                username: format!("user-{i}"),
                password: "pw".to_string(),
                age: 33,
            });
        }
        Arc::new(store)
    }

    #[tokio::test]
    async fn crud_over_grpc() {
        let (addr, _service) = spawn_server(Arc::new(UserStore::new())).await;
        let mut client = connect(addr).await;

        let created = client
            .create_user(CreateUserDto {
                username: "carol".to_string(),
                password: "pw".to_string(),
                age: 41,
            })
            .await
            .unwrap()
            .into_inner();

        let found = client
            .find_one_user(FindOneUserDto {
                id: created.id.clone(),
            })
            .await
            .unwrap()
            .into_inner();
        assert_eq!(found, created);

        let all = client.find_all_users(Empty {}).await.unwrap().into_inner();
        assert_eq!(all.users.len(), 1);

        client
            .remove_user(FindOneUserDto {
                id: created.id.clone(),
            })
            .await
            .unwrap();

        let status = client
            .find_one_user(FindOneUserDto { id: created.id })
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::NotFound);
    }

    #[tokio::test]
    async fn query_users_streams_one_chunk_per_page() {
        let (addr, _service) = spawn_server(store_with(10)).await;
        let mut client = connect(addr).await;

        let requests: Vec<PaginationDto> = PageCursor::new(10, 4)
            .unwrap()
            .iter()
            .map(PaginationDto::from)
            .collect();
        let mut responses = client
            .query_users(tokio_stream::iter(requests))
            .await
            .unwrap()
            .into_inner();

        let mut sizes = Vec::new();
        let mut names = Vec::new();
        while let Some(chunk) = responses.message().await.unwrap() {
            sizes.push(chunk.users.len());
            names.extend(chunk.users.into_iter().map(|u| u.username));
        }
        assert_eq!(sizes, vec![4, 4, 2]);
        let expected: Vec<String> = (0..10).map(|i| format!("user-{i}")).collect();
        assert_eq!(names, expected);
    }

    #[tokio::test]
    async fn query_users_with_no_pages_completes_empty() {
        let (addr, _service) = spawn_server(store_with(3)).await;
        let mut client = connect(addr).await;

        let mut responses = client
            .query_users(tokio_stream::iter(Vec::<PaginationDto>::new()))
            .await
            .unwrap()
            .into_inner();
        assert!(responses.message().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn zero_size_descriptor_fails_the_session() {
        let (addr, _service) = spawn_server(store_with(3)).await;
        let mut client = connect(addr).await;

        let requests = vec![
            PaginationDto { page: 0, size: 2 },
            PaginationDto { page: 1, size: 0 },
            PaginationDto { page: 1, size: 2 },
        ];
        let mut responses = client
            .query_users(tokio_stream::iter(requests))
            .await
            .unwrap()
            .into_inner();

        assert_eq!(responses.message().await.unwrap().unwrap().users.len(), 2);
        let status = responses.message().await.unwrap_err();
        assert_eq!(status.code(), Code::InvalidArgument);
    }

    #[tokio::test]
    async fn sessions_are_refused_after_shutdown() {
        let (addr, service) = spawn_server(store_with(3)).await;
        let mut client = connect(addr).await;

        service.shutdown().await.unwrap();

        let status = client
            .query_users(tokio_stream::iter(vec![PaginationDto { page: 0, size: 1 }]))
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::Unavailable);
    }
}
