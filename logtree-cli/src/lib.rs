//! logtree CLI -- 패턴 트리 기반 로그 분류 명령줄 도구
//!
//! 바이너리(`logtree`)는 얇은 진입점이고, 명령 처리 로직은 통합 테스트에서
//! 직접 호출할 수 있도록 이 라이브러리에 둡니다.

pub mod cli;
pub mod commands;
pub mod error;
pub mod logging;
pub mod output;
pub mod sinks;
