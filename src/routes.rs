use crate::{
    api::{attendance, auth, dashboard, students},
    auth::session_middleware,
    config::Config,
};
use actix_governor::{
    Governor, GovernorConfigBuilder, PeerIpKeyExtractor, governor::middleware::NoOpMiddleware,
};
use actix_web::{middleware::from_fn, web};
use std::sync::Arc;

/// Per-route limiter allowing `requests_per_min` per client IP.
fn build_limiter(requests_per_min: u32) -> Governor<PeerIpKeyExtractor, NoOpMiddleware> {
    let requests_per_min = requests_per_min.max(1);
    let cfg = GovernorConfigBuilder::default()
        .per_millisecond(60_000 / requests_per_min as u64)
        .burst_size(requests_per_min)
        .key_extractor(PeerIpKeyExtractor)
        .finish()
        .expect("limiter period and burst are non-zero");
    Governor::new(&cfg)
}

pub fn configure(cfg: &mut web::ServiceConfig, config: Config) {
    let signin_limiter = Arc::new(build_limiter(config.rate_signin_per_min));
    let signup_limiter = Arc::new(build_limiter(config.rate_signup_per_min));
    let reset_limiter = Arc::new(build_limiter(config.rate_reset_per_min));
    let protected_limiter = Arc::new(build_limiter(config.rate_protected_per_min));

    // Public routes
    cfg.service(
        web::scope("/auth")
            .service(
                web::resource("/signin")
                    .wrap(signin_limiter.clone())
                    .route(web::post().to(auth::sign_in)),
            )
            .service(
                web::resource("/signup")
                    .wrap(signup_limiter.clone())
                    .route(web::post().to(auth::sign_up)),
            )
            .service(
                web::resource("/confirm-email")
                    .wrap(signup_limiter.clone())
                    .route(web::post().to(auth::confirm_email)),
            )
            .service(
                web::resource("/email-available")
                    .wrap(signup_limiter.clone())
                    .route(web::get().to(auth::email_available)),
            )
            .service(
                web::resource("/forgot-password")
                    .wrap(reset_limiter.clone())
                    .route(web::post().to(auth::forgot_password)),
            )
            .service(
                web::resource("/reset-password")
                    .wrap(reset_limiter.clone())
                    .route(web::post().to(auth::reset_password)),
            )
            .service(
                web::resource("/signout")
                    .wrap(signin_limiter.clone())
                    .route(web::post().to(auth::sign_out)),
            ),
    );

    // Protected routes
    cfg.service(
        web::scope(&config.api_prefix)
            .wrap(from_fn(session_middleware)) // authentication
            .wrap(protected_limiter) // rate limiting
            .service(
                web::scope("/students")
                    // /students
                    .service(
                        web::resource("")
                            .route(web::get().to(students::list_students))
                            .route(web::post().to(students::create_student)),
                    )
                    // /students/courses
                    .service(
                        web::resource("/courses").route(web::get().to(students::list_courses)),
                    )
                    // /students/{id}
                    .service(
                        web::resource("/{id}")
                            .route(web::put().to(students::update_student))
                            .route(web::delete().to(students::delete_student)),
                    ),
            )
            .service(
                web::scope("/attendance")
                    // /attendance?date=&course=
                    .service(web::resource("").route(web::get().to(attendance::get_sheet)))
                    // /attendance/report
                    .service(web::resource("/report").route(web::get().to(attendance::report)))
                    // /attendance/{student_id}
                    .service(
                        web::resource("/{student_id}")
                            .route(web::put().to(attendance::set_status))
                            .route(web::delete().to(attendance::clear_status)),
                    ),
            )
            .service(
                web::scope("/dashboard")
                    .service(
                        web::resource("/teacher").route(web::get().to(dashboard::teacher_dashboard)),
                    )
                    .service(
                        web::resource("/student").route(web::get().to(dashboard::student_dashboard)),
                    ),
            )
            .service(web::resource("/pages").route(web::get().to(dashboard::pages))),
    );
}

// SIGN IN
//  └─ access_token (SESSION_TTL, default 8 h)

// API REQUEST
//  └─ Authorization: Bearer access_token

// SIGN OUT
//  └─ client drops the token
