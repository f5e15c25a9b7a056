//! End-to-end tests: the real router, auth layer included, served on an
//! ephemeral port and driven through the generated clients.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use crypto_core::JwtManager;
use grpc_jwt_propagation::{JwtClientInterceptor, JwtServerInterceptor, TokenRefresher, UnlistedMethods};
use laptop_service::config::SeedSettings;
use laptop_service::grpc::pb::{
    memory, CreateLaptopRequest, Filter, Laptop, LoginRequest, Memory, RateLaptopRequest,
    SearchLaptopRequest, UploadImageRequest,
};
use laptop_service::grpc::{
    access_policy, AuthClient, AuthServer, AuthServiceClient, LaptopServer, LaptopServiceClient,
    AUTHENTICATED_METHODS, MAX_IMAGE_SIZE,
};
use laptop_service::sample;
use laptop_service::server::{router, seed_users};
use laptop_service::store::{DiskImageStore, ImageStore, LaptopStore, RatingStore, UserStore};
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_stream::wrappers::{ReceiverStream, TcpListenerStream};
use tonic::codegen::InterceptedService;
use tonic::transport::{Channel, Endpoint};
use tonic::Code;

const SECRET: &str = "end-to-end-test-secret-0123456789abcdef";

type AuthedClient = LaptopServiceClient<InterceptedService<Channel, JwtClientInterceptor>>;

struct TestServer {
    channel: Channel,
    laptop_store: Arc<LaptopStore>,
    image_store: Arc<DiskImageStore>,
    _image_dir: TempDir,
}

impl TestServer {
    async fn start(unlisted: UnlistedMethods) -> Self {
        let image_dir = tempfile::tempdir().unwrap();
        let jwt = Arc::new(JwtManager::new(SECRET, Duration::from_secs(60)).unwrap());

        let user_store = Arc::new(UserStore::new());
        seed_users(
            &user_store,
            &SeedSettings {
                admin_password: "secret".to_string(),
                user_password: "secret".to_string(),
            },
        )
        .unwrap();

        let laptop_store = Arc::new(LaptopStore::new());
        let image_store = Arc::new(DiskImageStore::new(image_dir.path()).await.unwrap());
        let laptop_server = LaptopServer::new(
            Arc::clone(&laptop_store),
            image_store.clone(),
            Arc::new(RatingStore::new()),
        );
        let auth_server = AuthServer::new(user_store, Arc::clone(&jwt));
        let auth_layer = JwtServerInterceptor::new(jwt, access_policy(unlisted));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr: SocketAddr = listener.local_addr().unwrap();
        let incoming = TcpListenerStream::new(listener);

        tokio::spawn(async move {
            router(auth_layer, laptop_server, auth_server)
                .serve_with_incoming(incoming)
                .await
                .expect("serve laptop-service");
        });

        let channel = Endpoint::from_shared(format!("http://{}", addr))
            .unwrap()
            .connect()
            .await
            .unwrap();

        Self {
            channel,
            laptop_store,
            image_store,
            _image_dir: image_dir,
        }
    }

    fn anonymous(&self) -> LaptopServiceClient<Channel> {
        LaptopServiceClient::new(self.channel.clone())
    }

    async fn login_as(&self, username: &str) -> (AuthedClient, TokenRefresher) {
        let login = AuthClient::new(self.channel.clone(), username, "secret");
        let refresher = TokenRefresher::start(login, Duration::from_secs(30))
            .await
            .unwrap();
        let client = LaptopServiceClient::with_interceptor(
            self.channel.clone(),
            refresher.interceptor(AUTHENTICATED_METHODS),
        );
        (client, refresher)
    }
}

fn create_request(laptop: Laptop) -> CreateLaptopRequest {
    CreateLaptopRequest {
        laptop: Some(laptop),
    }
}

fn gigabytes(value: u64) -> Memory {
    Memory {
        value,
        unit: memory::Unit::Gigabyte as i32,
    }
}

#[tokio::test]
async fn test_login_rejects_bad_credentials() {
    let server = TestServer::start(UnlistedMethods::Allow).await;
    let mut auth = AuthServiceClient::new(server.channel.clone());

    let status = auth
        .login(LoginRequest {
            username: "admin1".to_string(),
            password: "wrong".to_string(),
        })
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::Unauthenticated);

    let token = auth
        .login(LoginRequest {
            username: "admin1".to_string(),
            password: "secret".to_string(),
        })
        .await
        .unwrap()
        .into_inner()
        .access_token;
    assert!(!token.is_empty());
}

#[tokio::test]
async fn test_policy_enforced_per_method() {
    let server = TestServer::start(UnlistedMethods::Allow).await;

    // Listed method without a credential
    let status = server
        .anonymous()
        .create_laptop(create_request(sample::new_laptop()))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::Unauthenticated);

    // Unlisted method without a credential
    let stream = server
        .anonymous()
        .search_laptop(SearchLaptopRequest::default())
        .await;
    assert!(stream.is_ok());

    // Listed method, wrong role
    let (mut user, _refresher) = server.login_as("user1").await;
    let status = user
        .create_laptop(create_request(sample::new_laptop()))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::PermissionDenied);
    assert!(server.laptop_store.is_empty().await);

    // Listed method, permitted role
    let (mut admin, _refresher) = server.login_as("admin1").await;
    let id = admin
        .create_laptop(create_request(sample::new_laptop()))
        .await
        .unwrap()
        .into_inner()
        .id;
    assert!(server.laptop_store.find(&id).await.is_some());

    // user may rate
    let mut responses = user
        .rate_laptop(tokio_stream::iter(vec![RateLaptopRequest {
            laptop_id: id.clone(),
            score: 9.0,
        }]))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(responses.message().await.unwrap().unwrap().rated_count, 1);
}

#[tokio::test]
async fn test_deny_unlisted_rejects_public_methods() {
    let server = TestServer::start(UnlistedMethods::Deny).await;

    let status = server
        .anonymous()
        .search_laptop(SearchLaptopRequest::default())
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::PermissionDenied);

    let status = AuthServiceClient::new(server.channel.clone())
        .login(LoginRequest {
            username: "admin1".to_string(),
            password: "secret".to_string(),
        })
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::PermissionDenied);
}

#[tokio::test]
async fn test_create_validates_id() {
    let server = TestServer::start(UnlistedMethods::Allow).await;
    let (mut admin, _refresher) = server.login_as("admin1").await;

    let mut laptop = sample::new_laptop();
    laptop.id = String::new();
    let id = admin
        .create_laptop(create_request(laptop.clone()))
        .await
        .unwrap()
        .into_inner()
        .id;
    laptop.id = id.clone();
    assert_eq!(server.laptop_store.find(&id).await, Some(laptop.clone()));

    let status = admin.create_laptop(create_request(laptop)).await.unwrap_err();
    assert_eq!(status.code(), Code::AlreadyExists);

    let mut invalid = sample::new_laptop();
    invalid.id = "not-a-uuid".to_string();
    let status = admin.create_laptop(create_request(invalid)).await.unwrap_err();
    assert_eq!(status.code(), Code::InvalidArgument);
}

#[tokio::test]
async fn test_search_streams_exactly_matching_laptops() {
    let server = TestServer::start(UnlistedMethods::Allow).await;
    let (mut admin, _refresher) = server.login_as("admin1").await;

    let filter = Filter {
        max_price_usd: 2000.0,
        min_cpu_cores: 4,
        min_cpu_ghz: 2.2,
        min_ram: Some(gigabytes(8)),
    };

    let mut expected = HashSet::new();
    for i in 0..10 {
        let mut laptop = sample::new_laptop();
        let cpu = laptop.cpu.as_mut().unwrap();
        cpu.number_cores = 4 + i % 3;
        cpu.min_ghz = 2.5;
        laptop.ram = Some(gigabytes(if i % 2 == 0 { 16 } else { 4 }));
        laptop.price_usd = if i % 5 == 0 { 2500.0 } else { 1500.0 };

        if i % 2 == 0 && i % 5 != 0 {
            expected.insert(laptop.id.clone());
        }
        admin.create_laptop(create_request(laptop)).await.unwrap();
    }

    let mut stream = server
        .anonymous()
        .search_laptop(SearchLaptopRequest {
            filter: Some(filter),
        })
        .await
        .unwrap()
        .into_inner();

    let mut found = HashSet::new();
    while let Some(response) = stream.message().await.unwrap() {
        found.insert(response.laptop.unwrap().id);
    }

    assert_eq!(found, expected);
}

#[tokio::test]
async fn test_dropped_search_releases_store() {
    let server = TestServer::start(UnlistedMethods::Allow).await;
    for _ in 0..200 {
        server.laptop_store.save(&sample::new_laptop()).await.unwrap();
    }

    let mut stream = server
        .anonymous()
        .search_laptop(SearchLaptopRequest {
            filter: Some(Filter {
                max_price_usd: f64::MAX,
                min_cpu_cores: 0,
                min_cpu_ghz: 0.0,
                min_ram: Some(gigabytes(0)),
            }),
        })
        .await
        .unwrap()
        .into_inner();

    assert!(stream.message().await.unwrap().is_some());
    drop(stream);

    let saved = tokio::time::timeout(
        Duration::from_secs(5),
        server.laptop_store.save(&sample::new_laptop()),
    )
    .await;
    assert!(matches!(saved, Ok(Ok(_))));
}

#[tokio::test]
async fn test_upload_image_size_limit() {
    let server = TestServer::start(UnlistedMethods::Allow).await;
    let (mut admin, _refresher) = server.login_as("admin1").await;
    let laptop_id = admin
        .create_laptop(create_request(sample::new_laptop()))
        .await
        .unwrap()
        .into_inner()
        .id;

    let upload = |total: usize| {
        let mut requests = vec![UploadImageRequest::info(&laptop_id, ".jpg")];
        let image = vec![42u8; total];
        requests.extend(image.chunks(1024).map(UploadImageRequest::chunk));
        tokio_stream::iter(requests)
    };

    let response = admin
        .upload_image(upload(MAX_IMAGE_SIZE))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(response.size as usize, MAX_IMAGE_SIZE);
    let info = server.image_store.find(&response.id).await.unwrap();
    assert_eq!(info.laptop_id, laptop_id);
    assert_eq!(tokio::fs::metadata(&info.path).await.unwrap().len() as usize, MAX_IMAGE_SIZE);

    let status = admin
        .upload_image(upload(MAX_IMAGE_SIZE + 1))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::InvalidArgument);

    let mut entries = tokio::fs::read_dir(server.image_store.image_dir()).await.unwrap();
    let mut files = 0;
    while entries.next_entry().await.unwrap().is_some() {
        files += 1;
    }
    assert_eq!(files, 1);
}

#[tokio::test]
async fn test_upload_for_unknown_laptop() {
    let server = TestServer::start(UnlistedMethods::Allow).await;
    let (mut admin, _refresher) = server.login_as("admin1").await;

    let requests = vec![
        UploadImageRequest::info(uuid::Uuid::new_v4().to_string(), ".png"),
        UploadImageRequest::chunk(vec![1, 2, 3]),
    ];
    let status = admin
        .upload_image(tokio_stream::iter(requests))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::InvalidArgument);
}

#[tokio::test]
async fn test_rate_laptop_responses_pair_with_requests() {
    let server = TestServer::start(UnlistedMethods::Allow).await;
    let (mut admin, _refresher) = server.login_as("admin1").await;
    let laptop_id = admin
        .create_laptop(create_request(sample::new_laptop()))
        .await
        .unwrap()
        .into_inner()
        .id;

    let (tx, rx) = mpsc::channel(1);
    let mut responses = admin
        .rate_laptop(ReceiverStream::new(rx))
        .await
        .unwrap()
        .into_inner();

    let scores = [3.0, 9.0, 6.0, 10.0];
    let mut sum = 0.0;
    for (i, score) in scores.into_iter().enumerate() {
        tx.send(RateLaptopRequest {
            laptop_id: laptop_id.clone(),
            score,
        })
        .await
        .unwrap();

        let response = responses.message().await.unwrap().unwrap();
        sum += score;
        assert_eq!(response.laptop_id, laptop_id);
        assert_eq!(response.rated_count as usize, i + 1);
        assert!((response.average_score - sum / (i + 1) as f64).abs() < 1e-9);
    }

    drop(tx);
    assert!(responses.message().await.unwrap().is_none());
}

#[tokio::test]
async fn test_rate_unknown_laptop_fails_stream() {
    let server = TestServer::start(UnlistedMethods::Allow).await;
    let (mut admin, _refresher) = server.login_as("admin1").await;

    let mut responses = admin
        .rate_laptop(tokio_stream::iter(vec![RateLaptopRequest {
            laptop_id: "missing".to_string(),
            score: 5.0,
        }]))
        .await
        .unwrap()
        .into_inner();

    let status = responses.message().await.unwrap_err();
    assert_eq!(status.code(), Code::NotFound);
}
