//! LaptopService handlers
//!
//! Unary create, server-streaming search, client-streaming image upload and
//! bidirectional rating. Authorization already happened in the auth layer; the
//! handlers only see calls that passed it.

use std::sync::Arc;

use futures::{Stream, StreamExt};
use grpc_jwt_propagation::JwtClaimsExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Code, Request, Response, Status, Streaming};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::laptop_service_server::LaptopService;
use super::pb::{
    upload_image_request::Data, CreateLaptopRequest, CreateLaptopResponse, ImageInfo,
    RateLaptopRequest, RateLaptopResponse, SearchLaptopRequest, SearchLaptopResponse,
    UploadImageRequest, UploadImageResponse,
};
use crate::context::CallContext;
use crate::error::{LaptopError, Result};
use crate::store::{ImageStore, LaptopStore, RatingStore};

/// Largest accepted image, in bytes
pub const MAX_IMAGE_SIZE: usize = 1 << 20;

/// Outbound messages buffered per streaming call
const STREAM_BUFFER: usize = 16;

type ResponseSender<T> = mpsc::Sender<std::result::Result<T, Status>>;

#[derive(Clone)]
pub struct LaptopServer {
    laptop_store: Arc<LaptopStore>,
    image_store: Arc<dyn ImageStore>,
    rating_store: Arc<RatingStore>,
}

impl LaptopServer {
    pub fn new(
        laptop_store: Arc<LaptopStore>,
        image_store: Arc<dyn ImageStore>,
        rating_store: Arc<RatingStore>,
    ) -> Self {
        Self {
            laptop_store,
            image_store,
            rating_store,
        }
    }

    /// Assign or validate the id, then store the laptop
    async fn create(&self, ctx: &CallContext, request: CreateLaptopRequest) -> Result<String> {
        let mut laptop = request
            .laptop
            .ok_or(LaptopError::MissingField("laptop"))?;

        if laptop.id.is_empty() {
            laptop.id = Uuid::new_v4().to_string();
        } else {
            Uuid::parse_str(&laptop.id)
                .map_err(|e| LaptopError::InvalidLaptopId(e.to_string()))?;
        }

        ctx.check()?;

        self.laptop_store.save(&laptop).await?;
        info!(laptop_id = %laptop.id, "Saved laptop");

        Ok(laptop.id)
    }

    /// Two-phase upload: one `info` message, then `chunk_data` until the stream ends
    async fn upload<S>(&self, ctx: &CallContext, mut stream: S) -> Result<UploadImageResponse>
    where
        S: Stream<Item = std::result::Result<UploadImageRequest, Status>> + Unpin,
    {
        let info: ImageInfo = match stream.next().await {
            Some(Ok(UploadImageRequest {
                data: Some(Data::Info(info)),
            })) => info,
            Some(Ok(_)) => {
                return Err(LaptopError::MalformedStream(
                    "first message must be image info".to_string(),
                ))
            }
            Some(Err(status)) => return Err(receive_error(status)),
            None => {
                return Err(LaptopError::MalformedStream(
                    "stream ended before image info".to_string(),
                ))
            }
        };

        if self.laptop_store.find(&info.laptop_id).await.is_none() {
            return Err(LaptopError::UnknownLaptop(info.laptop_id));
        }
        debug!(laptop_id = %info.laptop_id, image_type = %info.image_type, "Receiving image");

        let mut image = Vec::new();
        while let Some(message) = stream.next().await {
            let chunk = match message {
                Ok(UploadImageRequest {
                    data: Some(Data::ChunkData(chunk)),
                }) => chunk,
                Ok(_) => {
                    return Err(LaptopError::MalformedStream(
                        "expected chunk data after image info".to_string(),
                    ))
                }
                Err(status) => return Err(receive_error(status)),
            };

            ctx.check()?;

            let size = image.len() + chunk.len();
            if size > MAX_IMAGE_SIZE {
                return Err(LaptopError::ImageTooLarge {
                    size,
                    max: MAX_IMAGE_SIZE,
                });
            }
            image.extend_from_slice(&chunk);
        }

        let id = self
            .image_store
            .save(&info.laptop_id, &info.image_type, &image)
            .await?;

        Ok(UploadImageResponse {
            id,
            size: image.len() as u32,
        })
    }

    /// One response per request, in order, until the inbound stream ends
    async fn rate<S>(
        &self,
        ctx: &CallContext,
        mut stream: S,
        responses: &ResponseSender<RateLaptopResponse>,
    ) -> Result<()>
    where
        S: Stream<Item = std::result::Result<RateLaptopRequest, Status>> + Unpin,
    {
        while let Some(message) = stream.next().await {
            let request = message.map_err(receive_error)?;

            ctx.check()?;

            if self.laptop_store.find(&request.laptop_id).await.is_none() {
                return Err(LaptopError::LaptopNotFound(request.laptop_id));
            }

            let rating = self.rating_store.add(&request.laptop_id, request.score);
            debug!(
                laptop_id = %request.laptop_id,
                score = request.score,
                count = rating.count,
                "Laptop rated"
            );

            let response = RateLaptopResponse {
                laptop_id: request.laptop_id,
                rated_count: rating.count,
                average_score: rating.average().unwrap_or_default(),
            };

            responses
                .send(Ok(response))
                .await
                .map_err(|_| LaptopError::Send)?;
        }

        Ok(())
    }
}

/// A failed receive; peer cancellation and deadlines keep their own status
fn receive_error(status: Status) -> LaptopError {
    match status.code() {
        Code::Cancelled => LaptopError::Canceled,
        Code::DeadlineExceeded => LaptopError::DeadlineExceeded,
        _ => LaptopError::Receive(status.message().to_string()),
    }
}

/// Username and role of the verified caller, for log fields
fn caller<T>(request: &Request<T>) -> (String, &'static str) {
    match request.caller() {
        Some(claims) => (claims.username.clone(), claims.role.as_str()),
        None => ("anonymous".to_string(), "none"),
    }
}

/// Report a streaming handler's failure to the peer if it is still listening
async fn finish_stream<T>(method: &str, result: Result<()>, responses: &ResponseSender<T>) {
    match result {
        Ok(()) => debug!(method, "Stream completed"),
        Err(LaptopError::Send) => info!(method, "Client stopped receiving, stream aborted"),
        Err(err) => {
            warn!(method, error = %err, "Stream failed");
            // Nobody left to tell if the receiver is gone
            let _ = responses.send(Err(err.into())).await;
        }
    }
}

#[tonic::async_trait]
impl LaptopService for LaptopServer {
    async fn create_laptop(
        &self,
        request: Request<CreateLaptopRequest>,
    ) -> std::result::Result<Response<CreateLaptopResponse>, Status> {
        let ctx = CallContext::from_metadata(request.metadata());
        let (username, role) = caller(&request);

        let id = self
            .create(&ctx, request.into_inner())
            .await
            .map_err(|err| {
                warn!(%username, role, error = %err, "CreateLaptop failed");
                err
            })?;
        debug!(laptop_id = %id, %username, role, "CreateLaptop completed");

        Ok(Response::new(CreateLaptopResponse { id }))
    }

    type SearchLaptopStream = ReceiverStream<std::result::Result<SearchLaptopResponse, Status>>;

    async fn search_laptop(
        &self,
        request: Request<SearchLaptopRequest>,
    ) -> std::result::Result<Response<Self::SearchLaptopStream>, Status> {
        let ctx = CallContext::from_metadata(request.metadata());
        let filter = request.into_inner().filter.unwrap_or_default();
        info!(
            max_price_usd = filter.max_price_usd,
            min_cpu_cores = filter.min_cpu_cores,
            min_cpu_ghz = filter.min_cpu_ghz,
            "Search laptop request"
        );

        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let probe = tx.clone();
        let ctx = ctx.with_cancel_probe(move || probe.is_closed());
        let store = Arc::clone(&self.laptop_store);

        tokio::spawn(async move {
            let result = store
                .search(&ctx, &filter, |laptop| {
                    let tx = tx.clone();
                    async move {
                        tx.send(Ok(SearchLaptopResponse {
                            laptop: Some(laptop),
                        }))
                        .await
                        .map_err(|_| LaptopError::Send)
                    }
                })
                .await;

            finish_stream("SearchLaptop", result, &tx).await;
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }

    async fn upload_image(
        &self,
        request: Request<Streaming<UploadImageRequest>>,
    ) -> std::result::Result<Response<UploadImageResponse>, Status> {
        let ctx = CallContext::from_metadata(request.metadata());

        let response = self
            .upload(&ctx, request.into_inner())
            .await
            .map_err(|err| {
                warn!(error = %err, "UploadImage failed");
                err
            })?;

        info!(image_id = %response.id, size = response.size, "Image uploaded");
        Ok(Response::new(response))
    }

    type RateLaptopStream = ReceiverStream<std::result::Result<RateLaptopResponse, Status>>;

    async fn rate_laptop(
        &self,
        request: Request<Streaming<RateLaptopRequest>>,
    ) -> std::result::Result<Response<Self::RateLaptopStream>, Status> {
        let ctx = CallContext::from_metadata(request.metadata());
        let (username, role) = caller(&request);
        info!(%username, role, "Rate laptop stream opened");
        let inbound = request.into_inner();

        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let probe = tx.clone();
        let ctx = ctx.with_cancel_probe(move || probe.is_closed());
        let server = self.clone();

        tokio::spawn(async move {
            let result = server.rate(&ctx, inbound, &tx).await;
            finish_stream("RateLaptop", result, &tx).await;
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grpc::pb::Laptop;
    use crate::sample;
    use crate::store::DiskImageStore;
    use grpc_jwt_propagation::{JwtClaims, Role};
    use tempfile::TempDir;

    struct Fixture {
        server: LaptopServer,
        laptop_store: Arc<LaptopStore>,
        image_store: Arc<DiskImageStore>,
        _dir: TempDir,
    }

    async fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let laptop_store = Arc::new(LaptopStore::new());
        let image_store = Arc::new(DiskImageStore::new(dir.path()).await.unwrap());
        let server = LaptopServer::new(
            Arc::clone(&laptop_store),
            image_store.clone(),
            Arc::new(RatingStore::new()),
        );

        Fixture {
            server,
            laptop_store,
            image_store,
            _dir: dir,
        }
    }

    async fn stored_laptop(store: &LaptopStore) -> Laptop {
        let laptop = sample::new_laptop();
        store.save(&laptop).await.unwrap();
        laptop
    }

    fn create_request(laptop: Laptop) -> CreateLaptopRequest {
        CreateLaptopRequest {
            laptop: Some(laptop),
        }
    }

    fn messages<T>(items: Vec<T>) -> impl Stream<Item = std::result::Result<T, Status>> + Unpin {
        tokio_stream::iter(items.into_iter().map(Ok))
    }

    #[test]
    fn test_caller_reads_verified_claims() {
        let mut request = Request::new(());
        assert_eq!(caller(&request), ("anonymous".to_string(), "none"));

        request.extensions_mut().insert(JwtClaims {
            username: "admin1".to_string(),
            role: Role::Admin,
            iat: 0,
            exp: 0,
        });
        assert_eq!(caller(&request), ("admin1".to_string(), "admin"));
    }

    #[tokio::test]
    async fn test_create_laptop_with_caller_claims() {
        let f = fixture().await;
        let mut request = Request::new(create_request(sample::new_laptop()));
        request.extensions_mut().insert(JwtClaims {
            username: "admin1".to_string(),
            role: Role::Admin,
            iat: 0,
            exp: 0,
        });

        let id = f.server.create_laptop(request).await.unwrap().into_inner().id;
        assert!(f.laptop_store.find(&id).await.is_some());
    }

    #[tokio::test]
    async fn test_create_generates_missing_id() {
        let f = fixture().await;
        let mut laptop = sample::new_laptop();
        laptop.id = String::new();

        let id = f
            .server
            .create(&CallContext::default(), create_request(laptop.clone()))
            .await
            .unwrap();

        assert!(Uuid::parse_str(&id).is_ok());
        laptop.id = id.clone();
        assert_eq!(f.laptop_store.find(&id).await, Some(laptop));
    }

    #[tokio::test]
    async fn test_create_keeps_valid_id() {
        let f = fixture().await;
        let laptop = sample::new_laptop();

        let id = f
            .server
            .create(&CallContext::default(), create_request(laptop.clone()))
            .await
            .unwrap();
        assert_eq!(id, laptop.id);
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_id() {
        let f = fixture().await;
        let mut laptop = sample::new_laptop();
        laptop.id = "invalid-uuid".to_string();

        let err = f
            .server
            .create(&CallContext::default(), create_request(laptop))
            .await
            .unwrap_err();
        assert_eq!(err.to_status().code(), Code::InvalidArgument);
        assert!(f.laptop_store.is_empty().await);
    }

    #[tokio::test]
    async fn test_create_duplicate_id() {
        let f = fixture().await;
        let laptop = stored_laptop(&f.laptop_store).await;

        let err = f
            .server
            .create(&CallContext::default(), create_request(laptop))
            .await
            .unwrap_err();
        assert_eq!(err.to_status().code(), Code::AlreadyExists);
    }

    #[tokio::test]
    async fn test_create_checks_deadline_before_saving() {
        let f = fixture().await;
        let ctx = CallContext::default().with_deadline(tokio::time::Instant::now());

        let err = f
            .server
            .create(&ctx, create_request(sample::new_laptop()))
            .await
            .unwrap_err();

        assert!(matches!(err, LaptopError::DeadlineExceeded));
        assert!(f.laptop_store.is_empty().await);
    }

    #[tokio::test]
    async fn test_upload_exact_limit_succeeds() {
        let f = fixture().await;
        let laptop = stored_laptop(&f.laptop_store).await;

        let mut requests = vec![UploadImageRequest::info(&laptop.id, ".jpg")];
        requests.extend((0..MAX_IMAGE_SIZE / 1024).map(|_| UploadImageRequest::chunk(vec![7u8; 1024])));

        let response = f
            .server
            .upload(&CallContext::default(), messages(requests))
            .await
            .unwrap();

        assert_eq!(response.size as usize, MAX_IMAGE_SIZE);
        let info = f.image_store.find(&response.id).await.unwrap();
        assert_eq!(info.laptop_id, laptop.id);
        assert_eq!(tokio::fs::read(&info.path).await.unwrap().len(), MAX_IMAGE_SIZE);
    }

    #[tokio::test]
    async fn test_upload_over_limit_persists_nothing() {
        let f = fixture().await;
        let laptop = stored_laptop(&f.laptop_store).await;

        let requests = vec![
            UploadImageRequest::info(&laptop.id, ".jpg"),
            UploadImageRequest::chunk(vec![0u8; MAX_IMAGE_SIZE]),
            UploadImageRequest::chunk(vec![0u8; 1]),
        ];

        let err = f
            .server
            .upload(&CallContext::default(), messages(requests))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            LaptopError::ImageTooLarge { size, max } if size == MAX_IMAGE_SIZE + 1 && max == MAX_IMAGE_SIZE
        ));
        let mut entries = tokio::fs::read_dir(f.image_store.image_dir()).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upload_first_message_must_be_info() {
        let f = fixture().await;

        let err = f
            .server
            .upload(&CallContext::default(), messages(vec![UploadImageRequest::chunk(vec![1, 2, 3])]))
            .await
            .unwrap_err();
        assert_eq!(err.to_status().code(), Code::Unknown);

        let err = f
            .server
            .upload(&CallContext::default(), messages(Vec::<UploadImageRequest>::new()))
            .await
            .unwrap_err();
        assert_eq!(err.to_status().code(), Code::Unknown);
    }

    #[tokio::test]
    async fn test_upload_unknown_laptop() {
        let f = fixture().await;

        let requests = vec![
            UploadImageRequest::info(Uuid::new_v4().to_string(), ".jpg"),
            UploadImageRequest::chunk(vec![1, 2, 3]),
        ];
        let err = f
            .server
            .upload(&CallContext::default(), messages(requests))
            .await
            .unwrap_err();
        assert_eq!(err.to_status().code(), Code::InvalidArgument);
    }

    #[tokio::test]
    async fn test_upload_receive_error_aborts() {
        let f = fixture().await;
        let laptop = stored_laptop(&f.laptop_store).await;

        let stream = tokio_stream::iter(vec![
            Ok(UploadImageRequest::info(&laptop.id, ".jpg")),
            Ok(UploadImageRequest::chunk(vec![1, 2, 3])),
            Err(Status::internal("connection reset")),
        ]);
        let err = f
            .server
            .upload(&CallContext::default(), stream)
            .await
            .unwrap_err();
        assert_eq!(err.to_status().code(), Code::Unknown);

        let stream = tokio_stream::iter(vec![
            Ok(UploadImageRequest::info(&laptop.id, ".jpg")),
            Err(Status::cancelled("client went away")),
        ]);
        let err = f
            .server
            .upload(&CallContext::default(), stream)
            .await
            .unwrap_err();
        assert!(matches!(err, LaptopError::Canceled));
    }

    #[tokio::test]
    async fn test_upload_checks_deadline_per_chunk() {
        let f = fixture().await;
        let laptop = stored_laptop(&f.laptop_store).await;
        let ctx = CallContext::default().with_deadline(tokio::time::Instant::now());

        let requests = vec![
            UploadImageRequest::info(&laptop.id, ".jpg"),
            UploadImageRequest::chunk(vec![1, 2, 3]),
        ];
        let err = f.server.upload(&ctx, messages(requests)).await.unwrap_err();
        assert_eq!(err.to_status().code(), Code::DeadlineExceeded);
    }

    #[tokio::test]
    async fn test_rate_running_average() {
        let f = fixture().await;
        let laptop = stored_laptop(&f.laptop_store).await;
        let scores = [8.0, 3.0, 10.0, 5.0];

        let requests: Vec<_> = scores
            .iter()
            .map(|&score| RateLaptopRequest {
                laptop_id: laptop.id.clone(),
                score,
            })
            .collect();

        let (tx, mut rx) = mpsc::channel(scores.len());
        f.server
            .rate(&CallContext::default(), messages(requests), &tx)
            .await
            .unwrap();
        drop(tx);

        let mut sum = 0.0;
        for (i, score) in scores.iter().enumerate() {
            sum += score;
            let response = rx.recv().await.unwrap().unwrap();
            assert_eq!(response.laptop_id, laptop.id);
            assert_eq!(response.rated_count as usize, i + 1);
            assert!((response.average_score - sum / (i + 1) as f64).abs() < 1e-9);
        }
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_rate_checks_deadline() {
        let f = fixture().await;
        let laptop = stored_laptop(&f.laptop_store).await;
        let ctx = CallContext::default().with_deadline(tokio::time::Instant::now());

        let requests = vec![RateLaptopRequest {
            laptop_id: laptop.id.clone(),
            score: 9.0,
        }];

        let (tx, mut rx) = mpsc::channel(4);
        let err = f.server.rate(&ctx, messages(requests), &tx).await.unwrap_err();

        assert_eq!(err.to_status().code(), Code::DeadlineExceeded);
        assert!(rx.try_recv().is_err());
        assert_eq!(f.server.rating_store.get(&laptop.id), None);
    }

    #[tokio::test]
    async fn test_rate_stops_when_receiver_dropped() {
        let f = fixture().await;
        let laptop = stored_laptop(&f.laptop_store).await;

        let (tx, rx) = mpsc::channel(4);
        let probe = tx.clone();
        let ctx = CallContext::default().with_cancel_probe(move || probe.is_closed());
        drop(rx);

        let requests = vec![RateLaptopRequest {
            laptop_id: laptop.id.clone(),
            score: 9.0,
        }];
        let err = f.server.rate(&ctx, messages(requests), &tx).await.unwrap_err();

        assert!(matches!(err, LaptopError::Canceled));
        assert_eq!(f.server.rating_store.get(&laptop.id), None);
    }

    #[tokio::test]
    async fn test_rate_unknown_laptop_aborts() {
        let f = fixture().await;
        let laptop = stored_laptop(&f.laptop_store).await;

        let requests = vec![
            RateLaptopRequest {
                laptop_id: laptop.id.clone(),
                score: 7.0,
            },
            RateLaptopRequest {
                laptop_id: "missing".to_string(),
                score: 7.0,
            },
            RateLaptopRequest {
                laptop_id: laptop.id.clone(),
                score: 7.0,
            },
        ];

        let (tx, mut rx) = mpsc::channel(4);
        let err = f
            .server
            .rate(&CallContext::default(), messages(requests), &tx)
            .await
            .unwrap_err();

        assert_eq!(err.to_status().code(), Code::NotFound);
        assert_eq!(rx.recv().await.unwrap().unwrap().rated_count, 1);
        assert!(rx.try_recv().is_err());
    }
}
