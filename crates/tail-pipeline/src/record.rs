//! 레코드 조립 — 청크 스트림에서 멀티라인 레코드 산출
//!
//! [`RecordAssembler`]는 원시 바이트 청크를 물리 라인으로 스캔해 헤드
//! 라인(포맷 접두 일치, 포맷이 없으면 첫 라인)과 그에 이어지는 연속
//! 라인을 하나의 레코드로 묶습니다. 매처를 통과하지 못한 헤드 라인은
//! 그 연속 라인까지 함께 소비하고 건너뜁니다.
//!
//! 레코드가 청크 끝에서 잘린 경우에는 [`ChunkFetch`]로 다음 청크를
//! 제한 시간 안에서 한 번씩 기다려 이어붙입니다. 시간 안에 도착하지
//! 않으면 레코드는 그대로(부분 상태로) 산출됩니다. 이 제한 대기가
//! 조립 과정의 유일한 중단 지점입니다.
//!
//! 산출된 레코드는 청크를 가리키는 `Bytes` 세그먼트 목록이므로 복사
//! 없이 전달되며, 매칭 이후에는 변형되지 않습니다.

use std::sync::Arc;

use bytes::Bytes;

use crate::matcher::format::{Format, is_following_line};
use crate::matcher::{Matcher, matches_all};

/// 조립 중 추가 청크를 공급하는 훅
///
/// 필터는 자신의 인바운드 큐에서 제한 시간 대기로 구현하고, 테스트는
/// 미리 준비한 큐로 구현합니다. `None`은 "제한 시간 안에 다음 청크
/// 없음"을 뜻하며 조립을 그 자리에서 끝냅니다.
pub trait ChunkFetch: Send {
    /// 다음 청크를 기다립니다.
    fn next_chunk(&mut self) -> impl Future<Output = Option<Bytes>> + Send;
}

/// 멀티라인 레코드 조립기
#[derive(Clone)]
pub struct RecordAssembler {
    format: Option<Arc<Format>>,
}

impl RecordAssembler {
    /// 포맷으로 조립기를 생성합니다. 포맷이 없으면 들여쓰기 휴리스틱을
    /// 사용합니다.
    pub fn new(format: Option<Arc<Format>>) -> Self {
        Self { format }
    }

    /// 청크 하나를 스캔해 매처를 통과한 레코드들을 산출합니다.
    ///
    /// 각 레코드는 순서 있는 `Bytes` 세그먼트 목록입니다. 헤드 라인이나
    /// 연속 라인이 청크 경계에 걸치면 `fetch`로 추가 청크를 끌어와
    /// 완성하고, 접두 길이에 못 미치는 꼬리 조각은 헤드인지 연속
    /// 라인인지 판정될 때까지 이어붙입니다. 따라서 모든 청크가 제시간에
    /// 도착하는 한 산출 결과는 청크 분할 방식과 무관합니다. 끌어온
    /// 청크의 남은 내용은 같은 호출 안에서 계속 스캔됩니다.
    ///
    /// 거부된 헤드도 같은 방식으로 연속 라인을 끝까지 소비하며, 산출만
    /// 생략됩니다.
    pub async fn assemble<F: ChunkFetch>(
        &self,
        chunk: Bytes,
        matchers: &[Arc<dyn Matcher>],
        fetch: &mut F,
    ) -> Vec<Vec<Bytes>> {
        let format = self.format.as_deref();
        let mut data = index_to_line_start(format, chunk);
        let mut records = Vec::new();
        let mut idx = 0;

        // 앞 청크들에서 시작했지만 현재 청크에서야 헤드로 판정된 라인
        // (이미 수집한 세그먼트, 지금까지의 헤드 바이트 사본)
        let mut seed: Option<(Vec<Bytes>, Vec<u8>)> = None;

        'records: loop {
            // region_start..region_end: 현재 청크 안에서 이 레코드에
            // 속하는 영역 (내부 라인 종결 포함, 꼬리 라인 종결 제외)
            let mut segments: Vec<Bytes>;
            let mut head_overflow: Option<Vec<u8>>;
            let head_start;
            let mut region_start;
            let mut region_end;

            if let Some((carried, joined)) = seed.take() {
                // idx는 이미 현재 청크 안의 헤드 라인 끝에 있음
                segments = carried;
                head_overflow = Some(joined);
                head_start = 0;
                region_start = 0;
                region_end = idx;
            } else {
                if idx >= data.len() {
                    break;
                }

                segments = Vec::new();
                head_overflow = None;
                head_start = idx;
                region_start = idx;
                index_line_end(&data, &mut idx);
                region_end = idx;
            }

            // 헤드가 라인 종결 없이 청크 끝에 닿으면 다음 청크로 이어짐.
            // 매처는 완성된 헤드를 봐야 하므로 이때만 사본을 만듭니다.
            while idx >= data.len() {
                let Some(next) = fetch.next_chunk().await else {
                    break;
                };

                if region_end > region_start {
                    segments.push(data.slice(region_start..region_end));
                }
                head_overflow.get_or_insert_with(|| data[head_start..region_end].to_vec());

                data = next;
                idx = 0;
                region_start = 0;
                index_line_end(&data, &mut idx);
                region_end = idx;

                if let Some(head) = &mut head_overflow {
                    head.extend_from_slice(&data[..idx]);
                }
            }

            // 정렬이 남긴 꼬리 조각에서 시작한 헤드는 완성된 라인으로
            // 접두를 재검증합니다.
            let matched = match &head_overflow {
                Some(joined) => {
                    format.is_none_or(|f| f.prefix_match(joined)) && matches_all(matchers, joined)
                }
                None => {
                    let head = &data[head_start..region_end];
                    format.is_none_or(|f| f.prefix_match(head)) && matches_all(matchers, head)
                }
            };

            ignore_line_end(&data, &mut idx);

            // 직전 청크들 끝의 라인 종결 바이트. 레코드가 이어지면 내부
            // 종결로 포함되고, 여기서 레코드가 끝나면 버려집니다.
            let mut boundary_gap: Vec<Bytes> = Vec::new();

            // 연속 라인 소비. 청크 경계에서 잘린 라인은 다음 청크에서
            // 무조건 이어붙이고, 아직 헤드인지 연속 라인인지 모를 꼬리
            // 조각은 추가 청크로 완성해 판정합니다.
            'tail: loop {
                index_following_lines(format, &data, &mut idx, &mut region_end);

                if region_end > region_start {
                    segments.append(&mut boundary_gap);
                }

                if idx < data.len() {
                    if !line_is_undecided(format, &data[idx..]) {
                        // 다음 헤드가 이 청크 안에서 시작
                        break 'tail;
                    }

                    let tail_start = idx;
                    let mut committed =
                        (region_end > region_start).then(|| data.slice(region_start..region_end));
                    let gap = data.slice(region_end..tail_start);
                    let mut tail_segments = vec![data.slice(tail_start..)];
                    let mut joined = data[tail_start..].to_vec();

                    loop {
                        let Some(next) = fetch.next_chunk().await else {
                            // 판정 전에 스트림이 끊기면 연속 라인으로 취급
                            if let Some(slice) = committed.take() {
                                segments.push(slice);
                            }
                            segments.append(&mut boundary_gap);
                            if !gap.is_empty() {
                                segments.push(gap.clone());
                            }
                            segments.append(&mut tail_segments);

                            if matched && !segments.is_empty() {
                                records.push(segments);
                            }
                            return records;
                        };

                        if next.is_empty() {
                            continue;
                        }

                        let mut line_end = 0;
                        index_line_end(&next, &mut line_end);
                        joined.extend_from_slice(&next[..line_end]);
                        let terminated = line_end < next.len();

                        if !terminated && line_is_undecided(format, &joined) {
                            // 청크 전체가 아직 같은 라인의 일부
                            tail_segments.push(next.clone());
                            data = next;
                            continue;
                        }

                        if format.is_some_and(|f| f.prefix_match(&joined)) {
                            // 꼬리가 새 헤드였음: 현재 레코드를 닫고 헤드
                            // 상태를 다음 레코드로 넘김
                            if let Some(slice) = committed.take() {
                                segments.push(slice);
                            }
                            if matched && !segments.is_empty() {
                                records.push(segments);
                            }

                            data = next;
                            idx = line_end;
                            seed = Some((tail_segments, joined));
                            continue 'records;
                        }

                        // 연속 라인으로 판정: 조각 전체를 레코드에 포함
                        if let Some(slice) = committed.take() {
                            segments.push(slice);
                        }
                        segments.append(&mut boundary_gap);
                        if !gap.is_empty() {
                            segments.push(gap.clone());
                        }
                        segments.append(&mut tail_segments);

                        data = next;
                        idx = line_end;
                        region_start = 0;
                        region_end = line_end;
                        ignore_line_end(&data, &mut idx);
                        continue 'tail;
                    }
                }

                // 청크 소진: 마지막 라인이 종결 없이 잘렸으면 다음
                // 청크에서 무조건 이어붙이고, 종결로 끝났으면 경계에서
                // 연속 라인 판정을 재개합니다.
                let ended_mid_line = !data.is_empty() && !is_line_end(data[data.len() - 1]);

                let mut fetched = fetch.next_chunk().await;
                while fetched.as_ref().is_some_and(|n| n.is_empty()) {
                    fetched = fetch.next_chunk().await;
                }
                let Some(next) = fetched else {
                    break 'tail;
                };

                if region_end > region_start {
                    segments.push(data.slice(region_start..region_end));
                }
                if region_end < data.len() {
                    // 청크 꼬리의 라인 종결은 레코드가 이어질 때만 포함
                    boundary_gap.push(data.slice(region_end..));
                }

                data = next;
                idx = 0;
                region_start = 0;
                region_end = 0;

                if ended_mid_line {
                    index_line_end(&data, &mut idx);
                    region_end = idx;
                }
                ignore_line_end(&data, &mut idx);
            }

            if region_end > region_start {
                segments.push(data.slice(region_start..region_end));
            }

            if matched && !segments.is_empty() {
                records.push(segments);
            }
        }

        records
    }
}

/// 라인 종결 바이트인지 확인합니다. `\n`과 `\r`을 모두 인정합니다.
fn is_line_end(b: u8) -> bool {
    b == b'\n' || b == b'\r'
}

/// `idx`를 현재 라인의 끝(종결 바이트 위치)까지 전진시킵니다.
fn index_line_end(data: &[u8], idx: &mut usize) {
    while *idx < data.len() && !is_line_end(data[*idx]) {
        *idx += 1;
    }
}

/// `idx`를 연속된 라인 종결 바이트 너머로 전진시킵니다 (`\r\n` 병합).
fn ignore_line_end(data: &[u8], idx: &mut usize) {
    while *idx < data.len() && is_line_end(data[*idx]) {
        *idx += 1;
    }
}

/// `idx`부터 이어지는 연속 라인을 모두 소비하고 `end`를 마지막 연속
/// 라인의 끝으로 갱신합니다. 판정 불가 꼬리 조각 앞에서 멈춥니다.
fn index_following_lines(format: Option<&Format>, data: &[u8], idx: &mut usize, end: &mut usize) {
    while *idx < data.len()
        && !line_is_undecided(format, &data[*idx..])
        && is_following_line(format, &data[*idx..])
    {
        index_line_end(data, idx);
        *end = *idx;
        ignore_line_end(data, idx);
    }
}

/// 청크 끝에 잘린 라인 조각이 헤드인지 연속 라인인지 아직 판정할 수
/// 없는지 확인합니다.
///
/// 접두 길이에 못 미치면서 접두와 어긋나지도 않은, 종결 없는 조각이
/// 그렇습니다. 포맷이 없으면 첫 바이트만으로 판정되므로 항상 거짓입니다.
fn line_is_undecided(format: Option<&Format>, tail: &[u8]) -> bool {
    let Some(format) = format else {
        return false;
    };

    tail.len() < format.prefix().len()
        && !tail.iter().copied().any(is_line_end)
        && format.prefix_could_match(tail)
}

/// 청크를 첫 헤드 라인의 시작으로 정렬합니다.
///
/// 청크가 레코드 중간(연속 라인)에서 시작하면 그 앞부분은 버립니다.
/// 종결 없이 끝난 마지막 조각은 아직 헤드가 될 수 있으면 남겨서 다음
/// 청크와 이어 판정하게 합니다. 헤드가 될 수 있는 라인이 없으면 빈
/// `Bytes`를 반환합니다.
pub fn index_to_line_start(format: Option<&Format>, data: Bytes) -> Bytes {
    let Some(format) = format else {
        return data;
    };

    let mut idx = 0;

    while idx < data.len() {
        if format.prefix_match(&data[idx..]) {
            return data.slice(idx..);
        }

        let line_start = idx;
        index_line_end(&data, &mut idx);

        if idx >= data.len() {
            if format.prefix_could_match(&data[line_start..]) {
                return data.slice(line_start..);
            }
            return Bytes::new();
        }

        ignore_line_end(&data, &mut idx);
    }

    Bytes::new()
}
